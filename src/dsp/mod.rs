//! DSP stage: downmix, resampling, gating, and normalization.
//!
//! Converts raw captured audio (arbitrary rate, interleaved channels) into
//! the canonical format the pipeline analyzes: mono f32 at the configured
//! sample rate, gated and level-normalized. Everything here is deterministic
//! for identical input; the only state is the resampler phase and the gate's
//! smoothed gain, both owned by the pipeline and reset at session start.

/// Down-mix interleaved multi-channel audio to mono by averaging channels.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Streaming linear resampler.
///
/// Carries interpolation phase and the last input sample across calls so a
/// continuous stream can be fed in arbitrary block sizes without seams.
/// Linear interpolation is deliberate: bit-deterministic and cheap enough
/// for the pipeline thread.
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Fractional read position relative to the start of the next input
    /// block. In `[-1, 0)` when the next output interpolates across the
    /// block boundary.
    pos: f64,
    /// Last sample of the previous block, for cross-boundary interpolation.
    carry: f32,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            pos: 0.0,
            carry: 0.0,
        }
    }

    /// Reset phase state. Called at session start.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.carry = 0.0;
    }

    /// Resample one block, appending converted samples to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        if self.from_rate == self.to_rate {
            out.extend_from_slice(input);
            return;
        }

        let step = self.from_rate as f64 / self.to_rate as f64;
        let mut pos = self.pos;
        let limit = input.len() as f64 - 1.0;
        while pos < limit {
            let sample = if pos < 0.0 {
                let frac = (pos + 1.0) as f32;
                self.carry + (input[0] - self.carry) * frac
            } else {
                let i = pos as usize;
                let frac = (pos - i as f64) as f32;
                input[i] + (input[i + 1] - input[i]) * frac
            };
            out.push(sample);
            pos += step;
        }
        self.carry = input[input.len() - 1];
        self.pos = pos - input.len() as f64;
    }
}

/// Noise gate with one-pole gain smoothing.
///
/// Samples below the threshold are attenuated toward zero by ramping a gain
/// factor instead of hard-zeroing, so gating introduces no discontinuities
/// that would read as clicks to the classifier.
pub struct NoiseGate {
    threshold: f32,
    attack: f32,
    release: f32,
    gain: f32,
}

impl NoiseGate {
    /// Per-sample smoothing coefficient when the gate opens (~3 ms at 16 kHz).
    const ATTACK: f32 = 0.02;
    /// Per-sample smoothing coefficient when the gate closes (~12 ms at 16 kHz).
    const RELEASE: f32 = 0.005;

    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            attack: Self::ATTACK,
            release: Self::RELEASE,
            gain: 0.0,
        }
    }

    /// Reset smoothing state. Called at session start.
    pub fn reset(&mut self) {
        self.gain = 0.0;
    }

    /// Gate one block in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            let target = if s.abs() < self.threshold { 0.0 } else { 1.0 };
            let coeff = if target > self.gain {
                self.attack
            } else {
                self.release
            };
            self.gain += coeff * (target - self.gain);
            *s *= self.gain;
        }
    }
}

/// Remove DC offset from a block of samples.
pub fn remove_dc_offset(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean: f32 = samples.iter().sum::<f32>() / samples.len() as f32;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// Maximum gain the per-window normalizer will apply. Keeps quiet-but-gated
/// windows from being blown up into noise.
const MAX_NORMALIZE_GAIN: f32 = 4.0;

/// Peak-normalize a window toward `target_peak` so window energy is
/// comparable across devices with different input gains. Near-silent
/// windows are left untouched.
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) {
    let peak = samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    if peak <= 1e-6 {
        return;
    }
    let gain = (target_peak / peak).min(MAX_NORMALIZE_GAIN);
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

/// Root mean square of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
