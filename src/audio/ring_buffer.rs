//! Lock-free SPSC ring buffer for audio samples.
//!
//! Passes f32 samples from the cpal callback thread to the pipeline thread
//! without locks. Overflow policy is drop-oldest: the writer never waits on
//! the reader, and a reader that falls more than `capacity` behind skips
//! forward and accounts the lost samples in an observable counter.
//!
//! Samples are stored as `AtomicU32` bit patterns so a writer lapping a
//! slow reader can never tear a value. A lapped read may splice in newer
//! samples; that is an audio glitch, not a safety problem, and it is
//! surfaced through the overflow counter.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Default capacity: ~10 seconds of 16 kHz mono audio.
pub const DEFAULT_CAPACITY: usize = 160_000;

/// Shared state behind the producer/consumer halves.
struct SampleRing {
    cells: Box<[AtomicU32]>,
    /// Total samples ever written. Only the producer advances this.
    written: AtomicU64,
    /// Total samples lost to overflow, visible to the consumer side.
    overflow: AtomicU64,
}

/// Producer half; lives in the cpal audio callback thread.
pub struct AudioProducer {
    ring: Arc<SampleRing>,
}

/// Consumer half; lives in the pipeline thread.
pub struct AudioConsumer {
    ring: Arc<SampleRing>,
    /// Total samples this consumer has read or skipped.
    read: u64,
}

/// Create a matched producer/consumer pair backed by a lock-free ring buffer.
///
/// `capacity` of `None` uses [`DEFAULT_CAPACITY`].
pub fn sample_ring(capacity: Option<usize>) -> (AudioProducer, AudioConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY).max(1);
    let cells = (0..cap).map(|_| AtomicU32::new(0)).collect::<Vec<_>>();
    let ring = Arc::new(SampleRing {
        cells: cells.into_boxed_slice(),
        written: AtomicU64::new(0),
        overflow: AtomicU64::new(0),
    });
    (
        AudioProducer { ring: ring.clone() },
        AudioConsumer { ring, read: 0 },
    )
}

impl AudioProducer {
    /// Write a slice of samples, overwriting the oldest unread data when the
    /// buffer is full. Wait-free: no locks, no allocation, bounded time.
    /// Safe to call from a real-time audio callback.
    pub fn write(&self, samples: &[f32]) {
        let ring = &*self.ring;
        let cap = ring.cells.len() as u64;
        let start = ring.written.load(Ordering::Relaxed);
        for (i, &s) in samples.iter().enumerate() {
            let idx = ((start + i as u64) % cap) as usize;
            ring.cells[idx].store(s.to_bits(), Ordering::Relaxed);
        }
        ring.written
            .store(start + samples.len() as u64, Ordering::Release);
    }

    /// Capacity in samples.
    pub fn capacity(&self) -> usize {
        self.ring.cells.len()
    }
}

impl AudioConsumer {
    /// Pop up to `buf.len()` samples into `buf`, oldest first.
    /// Returns the number of samples copied. Never blocks.
    pub fn read(&mut self, buf: &mut [f32]) -> usize {
        let ring = &*self.ring;
        let cap = ring.cells.len() as u64;
        let written = ring.written.load(Ordering::Acquire);

        // Fell more than a full buffer behind: the oldest samples are gone.
        let behind = written - self.read;
        if behind > cap {
            let skipped = behind - cap;
            self.read += skipped;
            ring.overflow.fetch_add(skipped, Ordering::Relaxed);
        }

        let n = (written - self.read).min(buf.len() as u64) as usize;
        for (i, slot) in buf.iter_mut().enumerate().take(n) {
            let idx = ((self.read + i as u64) % cap) as usize;
            *slot = f32::from_bits(ring.cells[idx].load(Ordering::Relaxed));
        }

        // The producer may have lapped us mid-copy; the overwritten prefix
        // then contains newer samples. Count it so the glitch is observable.
        let written_after = ring.written.load(Ordering::Acquire);
        if written_after - self.read > cap {
            let lapped = (written_after - self.read - cap).min(n as u64);
            ring.overflow.fetch_add(lapped, Ordering::Relaxed);
        }

        self.read += n as u64;
        n
    }

    /// Number of samples currently available for reading.
    pub fn available(&self) -> usize {
        let written = self.ring.written.load(Ordering::Acquire);
        let behind = written - self.read;
        behind.min(self.ring.cells.len() as u64) as usize
    }

    /// Total samples lost to overflow since creation.
    pub fn overflow_count(&self) -> u64 {
        self.ring.overflow.load(Ordering::Relaxed)
    }
}
