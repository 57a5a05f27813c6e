//! Chunker: slices the normalized sample stream into analysis windows.
//!
//! Accumulates canonical 16 kHz mono samples and emits fixed-duration
//! windows tagged with a monotone sequence number and the wall-clock
//! timestamp of their start sample. Supports optional overlap; `flush`
//! emits the trailing partial window so the final audio of a session is
//! not lost.

use chrono::{DateTime, Duration, Utc};

/// One fixed-duration slice of normalized audio, the unit of inference work.
/// Immutable once created; consumed exactly once by the inference adapter.
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    /// Canonical mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Monotone sequence number, starting at 0 for each session.
    pub seq: u64,
    /// Wall-clock timestamp of the window's first sample.
    pub timestamp: DateTime<Utc>,
    /// True for the flushed final window of a session, which may be shorter
    /// than the configured duration.
    pub short: bool,
}

impl AnalysisWindow {
    /// Duration of this window in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Converts a continuous sample stream into discrete [`AnalysisWindow`]s.
pub struct Chunker {
    window_len: usize,
    hop: usize,
    sample_rate: u32,
    session_start: DateTime<Utc>,
    pending: Vec<f32>,
    next_seq: u64,
    /// Canonical-stream index of `pending[0]`, for timestamping.
    start_sample: u64,
}

impl Chunker {
    /// `overlap` is the window fraction shared with the previous window,
    /// in `[0, 1)`; 0 means back-to-back windows.
    pub fn new(
        sample_rate: u32,
        window_ms: u32,
        overlap: f32,
        session_start: DateTime<Utc>,
    ) -> Self {
        let window_len = ((sample_rate as u64 * window_ms as u64) / 1000).max(1) as usize;
        let overlap = overlap.clamp(0.0, 0.95);
        let hop = ((window_len as f32) * (1.0 - overlap)).round().max(1.0) as usize;
        Self {
            window_len,
            hop,
            sample_rate,
            session_start,
            pending: Vec::with_capacity(window_len * 2),
            next_seq: 0,
            start_sample: 0,
        }
    }

    /// Samples per full window.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Feed normalized samples, appending any completed windows to `out`.
    pub fn push(&mut self, samples: &[f32], out: &mut Vec<AnalysisWindow>) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.window_len {
            let window = self.emit(self.pending[..self.window_len].to_vec(), false);
            out.push(window);
            self.pending.drain(..self.hop);
            self.start_sample += self.hop as u64;
        }
    }

    /// Flush the trailing partial window, if any. Called on session stop.
    pub fn flush(&mut self) -> Option<AnalysisWindow> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.pending);
        let window = self.emit(samples, true);
        self.start_sample += window.samples.len() as u64;
        Some(window)
    }

    fn emit(&mut self, samples: Vec<f32>, short: bool) -> AnalysisWindow {
        let offset_ms = self.start_sample as i64 * 1000 / self.sample_rate as i64;
        let window = AnalysisWindow {
            samples,
            sample_rate: self.sample_rate,
            seq: self.next_seq,
            timestamp: self.session_start + Duration::milliseconds(offset_ms),
            short,
        };
        self.next_seq += 1;
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(window_ms: u32, overlap: f32) -> Chunker {
        Chunker::new(16_000, window_ms, overlap, Utc::now())
    }

    #[test]
    fn emits_fixed_length_windows_with_gapless_seqs() {
        let mut c = chunker(100, 0.0);
        let mut out = Vec::new();
        // 5 windows' worth plus a remainder.
        c.push(&vec![0.1f32; 1600 * 5 + 700], &mut out);

        assert_eq!(out.len(), 5);
        for (i, w) in out.iter().enumerate() {
            assert_eq!(w.seq, i as u64);
            assert_eq!(w.samples.len(), 1600);
            assert!(!w.short);
        }
    }

    #[test]
    fn windows_accumulate_across_pushes() {
        let mut c = chunker(100, 0.0);
        let mut out = Vec::new();
        // Feed in blocks smaller than a window.
        for _ in 0..10 {
            c.push(&vec![0.0f32; 400], &mut out);
        }
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].seq, 0);
        assert_eq!(out[1].seq, 1);
    }

    #[test]
    fn flush_emits_short_final_window() {
        let mut c = chunker(100, 0.0);
        let mut out = Vec::new();
        c.push(&vec![0.2f32; 1600 + 300], &mut out);
        assert_eq!(out.len(), 1);

        let tail = c.flush().expect("partial window");
        assert_eq!(tail.samples.len(), 300);
        assert_eq!(tail.seq, 1);
        assert!(tail.short);

        // Nothing left after flush.
        assert!(c.flush().is_none());
    }

    #[test]
    fn flush_on_empty_stream_is_none() {
        let mut c = chunker(100, 0.0);
        assert!(c.flush().is_none());
    }

    #[test]
    fn overlap_halves_the_hop() {
        let mut c = chunker(100, 0.5);
        let mut out = Vec::new();
        let samples: Vec<f32> = (0..3200).map(|i| i as f32).collect();
        c.push(&samples, &mut out);

        // hop = 800: windows start at 0, 800, 1600, 2400 needs 4000 samples,
        // so we get starts 0, 800, 1600.
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].samples[0], 0.0);
        assert_eq!(out[1].samples[0], 800.0);
        assert_eq!(out[2].samples[0], 1600.0);
        // Overlapping region is shared between consecutive windows.
        assert_eq!(out[0].samples[800], out[1].samples[0]);
    }

    #[test]
    fn timestamps_advance_with_the_stream() {
        let start = Utc::now();
        let mut c = Chunker::new(16_000, 100, 0.0, start);
        let mut out = Vec::new();
        c.push(&vec![0.0f32; 4800], &mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].timestamp, start);
        assert_eq!(out[1].timestamp, start + Duration::milliseconds(100));
        assert_eq!(out[2].timestamp, start + Duration::milliseconds(200));
    }
}
