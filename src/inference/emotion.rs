//! Vocal mood classification from acoustic features.
//!
//! A heuristic, not a trained model: extracts RMS energy, zero-crossing
//! rate, an autocorrelation pitch estimate, and sub-frame energy variance,
//! then maps the feature vector to one of seven labels through fixed scoring
//! rules drawn from speech prosody heuristics. Deterministic and fast enough
//! to classify a window in far less than the window's own duration.

use serde::{Deserialize, Serialize};

use crate::dsp;

/// The seven supported mood labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Surprised,
    Disgusted,
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Fearful => "fearful",
            Self::Surprised => "surprised",
            Self::Disgusted => "disgusted",
        };
        write!(f, "{name}")
    }
}

/// Classification output: the winning label and its normalized score.
///
/// Confidence reflects distance from the scoring boundaries, not a
/// calibrated probability.
#[derive(Debug, Clone)]
pub struct EmotionScore {
    pub label: EmotionLabel,
    pub confidence: f32,
}

/// Acoustic features extracted per window.
#[derive(Debug, Clone)]
pub struct AudioFeatures {
    /// Root mean square energy (loudness).
    pub rms: f32,
    /// Zero-crossing rate (timbre proxy).
    pub zcr: f32,
    /// Estimated fundamental frequency in Hz; 0 when no clear pitch.
    pub pitch_hz: f32,
    /// Standard deviation of sub-frame energy (speech rhythm).
    pub energy_variance: f32,
}

/// Feature-based heuristic classifier.
///
/// Stateless per call; identical input always yields identical output.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one window of canonical mono audio.
    pub fn classify(&self, samples: &[f32], sample_rate: u32) -> EmotionScore {
        let features = extract_features(samples, sample_rate);
        tracing::debug!(
            rms = features.rms,
            zcr = features.zcr,
            pitch_hz = features.pitch_hz,
            energy_variance = features.energy_variance,
            "extracted vocal features"
        );
        score_features(&features)
    }
}

/// Scoring rules over normalized features.
///
/// Scores are kept in a fixed-order array (not a map) so the winning label
/// under ties is deterministic.
fn score_features(features: &AudioFeatures) -> EmotionScore {
    // Normalize raw features into [0, 1] working ranges.
    let energy = (features.rms * 10.0).clamp(0.0, 1.0);
    let pitch = (features.pitch_hz / 300.0).clamp(0.0, 1.0);
    let variance = (features.energy_variance * 50.0).clamp(0.0, 1.0);

    // Prosody heuristics: high energy + high pitch + high variance reads as
    // angry; variance-dominated signals as surprised; low everything as sad.
    let scores = [
        (
            EmotionLabel::Neutral,
            (1.0 - energy * 0.3) * (1.0 - variance * 0.3) * 0.8,
        ),
        (
            EmotionLabel::Happy,
            energy * 0.4 + pitch * 0.3 + variance * 0.2,
        ),
        (
            EmotionLabel::Sad,
            (1.0 - energy) * 0.5 + (1.0 - pitch) * 0.3 + (1.0 - variance) * 0.2,
        ),
        (
            EmotionLabel::Angry,
            energy * 0.5 + pitch * 0.3 + variance * 0.4,
        ),
        (
            EmotionLabel::Fearful,
            (1.0 - energy) * 0.2 + pitch * 0.4 + variance * 0.5,
        ),
        (EmotionLabel::Surprised, variance * 0.6 + pitch * 0.3),
        (
            EmotionLabel::Disgusted,
            (1.0 - energy) * 0.4 + (1.0 - pitch) * 0.3,
        ),
    ];

    let total: f32 = scores.iter().map(|(_, s)| s).sum();
    let (label, raw) = scores
        .iter()
        .copied()
        .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
        .unwrap_or((EmotionLabel::Neutral, 0.0));

    let confidence = if total > 0.0 { raw / total } else { 0.0 };
    EmotionScore { label, confidence }
}

/// Extract the acoustic feature vector for one window.
pub fn extract_features(samples: &[f32], sample_rate: u32) -> AudioFeatures {
    AudioFeatures {
        rms: dsp::rms(samples),
        zcr: zero_crossing_rate(samples),
        pitch_hz: estimate_pitch(samples, sample_rate),
        energy_variance: energy_variance(samples, sample_rate),
    }
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| w[0].signum() != w[1].signum())
        .count() as f32;
    crossings / (samples.len() - 1) as f32
}

/// Autocorrelation pitch estimate over a ~30 ms analysis window.
/// Searches lags covering 50–400 Hz; returns 0 for unvoiced/unclear input.
fn estimate_pitch(samples: &[f32], sample_rate: u32) -> f32 {
    if samples.len() < 256 {
        return 0.0;
    }

    let window = ((sample_rate as f32 * 0.03) as usize)
        .min(samples.len())
        .max(64);
    let min_lag = (sample_rate / 400) as usize;
    let max_lag = ((sample_rate / 50) as usize).min(window / 2);
    if min_lag >= max_lag {
        return 0.0;
    }

    let mut best_lag = 0usize;
    let mut best_corr = 0.0f32;
    for lag in min_lag..max_lag {
        let mut corr = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for i in 0..window - lag {
            corr += samples[i] * samples[i + lag];
            norm_a += samples[i] * samples[i];
            norm_b += samples[i + lag] * samples[i + lag];
        }
        let normalized = if norm_a > 0.0 && norm_b > 0.0 {
            corr / (norm_a * norm_b).sqrt()
        } else {
            0.0
        };
        // Require a meaningfully better peak before switching lags, so a
        // sub-harmonic at double the lag cannot win on float noise alone.
        if normalized > best_corr + 1e-4 {
            best_corr = normalized;
            best_lag = lag;
        }
    }

    // Require a clear correlation peak before claiming a pitch.
    if best_corr > 0.3 && best_lag > 0 {
        sample_rate as f32 / best_lag as f32
    } else {
        0.0
    }
}

/// Standard deviation of RMS energy across ~50 ms sub-frames.
fn energy_variance(samples: &[f32], sample_rate: u32) -> f32 {
    let sub = ((sample_rate as f32 * 0.05) as usize).max(1);
    if samples.len() < sub * 2 {
        return 0.0;
    }
    let energies: Vec<f32> = samples.chunks(sub).map(dsp::rms).collect();
    let mean = energies.iter().sum::<f32>() / energies.len() as f32;
    let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f32>()
        / energies.len() as f32;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 s of alternating loud 300 Hz bursts and near-silence: high energy,
    /// strong pitch, and large sub-frame energy swings.
    fn agitated_signal() -> Vec<f32> {
        let rate = 16_000usize;
        (0..rate)
            .map(|i| {
                let t = i as f32 / rate as f32;
                let burst = (i / 800) % 2 == 0;
                if burst {
                    0.9 * (2.0 * std::f32::consts::PI * 300.0 * t).sin()
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn silence_has_near_zero_features() {
        let features = extract_features(&vec![0.0f32; 16_000], 16_000);
        assert!(features.rms < 1e-3);
        assert!(features.zcr < 0.01);
        assert_eq!(features.pitch_hz, 0.0);
        assert!(features.energy_variance < 1e-3);
    }

    #[test]
    fn pitch_estimate_finds_a_pure_tone() {
        let rate = 16_000;
        let samples: Vec<f32> = (0..rate)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / rate as f32).sin())
            .collect();
        let pitch = estimate_pitch(&samples, rate as u32);
        assert!((pitch - 200.0).abs() < 20.0, "pitch {}", pitch);
    }

    #[test]
    fn zcr_is_high_for_square_wave() {
        let samples: Vec<f32> = (0..1000)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert!(zero_crossing_rate(&samples) > 0.9);
    }

    #[test]
    fn classify_is_deterministic() {
        let classifier = HeuristicClassifier::new();
        let samples = agitated_signal();
        let a = classifier.classify(&samples, 16_000);
        let b = classifier.classify(&samples, 16_000);
        assert_eq!(a.label, b.label);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn high_energy_high_variance_reads_agitated() {
        let classifier = HeuristicClassifier::new();
        let score = classifier.classify(&agitated_signal(), 16_000);
        assert!(
            matches!(score.label, EmotionLabel::Angry | EmotionLabel::Surprised),
            "got {}",
            score.label
        );
        assert!(score.confidence > 0.0);
    }

    #[test]
    fn silence_does_not_read_agitated() {
        let classifier = HeuristicClassifier::new();
        let score = classifier.classify(&vec![0.0f32; 16_000], 16_000);
        assert!(
            matches!(score.label, EmotionLabel::Neutral | EmotionLabel::Sad),
            "got {}",
            score.label
        );
    }

    #[test]
    fn short_windows_still_classify() {
        let classifier = HeuristicClassifier::new();
        let score = classifier.classify(&vec![0.01f32; 120], 16_000);
        assert!(score.confidence >= 0.0);
    }

    #[test]
    fn label_serialization_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&EmotionLabel::Surprised).unwrap(),
            "\"surprised\""
        );
        assert_eq!(format!("{}", EmotionLabel::Happy), "happy");
    }
}
