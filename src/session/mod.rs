//! Session lifecycle: state machine types, configuration, and errors.

pub mod orchestrator;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use orchestrator::{Orchestrator, SessionHandle};

/// Session lifecycle states. Exactly one value at any time, owned solely by
/// the orchestrator; transitions are the only permitted mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Processing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Processing => write!(f, "processing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested device could not be resolved or opened. Surfaced to
    /// the caller; no state transition occurs.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The operation is not legal in the current state. Rejected
    /// synchronously; state unchanged.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },
    /// The orchestrator task is gone.
    #[error("session orchestrator unavailable")]
    Closed,
}

/// Immutable configuration snapshot taken at `start_session` time.
/// Never mutated mid-session; changing it requires stop and restart.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Input device name; `None` selects the system default.
    pub device: Option<String>,
    /// Canonical analysis sample rate in Hz.
    pub sample_rate: u32,
    /// Analysis window duration in milliseconds.
    pub window_ms: u32,
    /// Window overlap fraction in `[0, 1)`; 0 means back-to-back windows.
    pub overlap: f32,
    /// Noise-gate threshold on a [-1, 1] normalized scale.
    pub silence_threshold: f32,
    pub enable_transcription: bool,
    pub enable_emotion: bool,
    /// Bound on a single transcription call before it counts as timed out.
    pub transcription_timeout_ms: u64,
    /// Inference queue depth before backpressure sets in.
    pub max_inference_queue: usize,
    /// Ring buffer capacity in samples; raised automatically to at least
    /// 4x the window duration.
    pub ring_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 16_000,
            window_ms: 100,
            overlap: 0.0,
            silence_threshold: 0.01,
            enable_transcription: true,
            enable_emotion: true,
            transcription_timeout_ms: 5_000,
            max_inference_queue: 8,
            ring_capacity: crate::audio::ring_buffer::DEFAULT_CAPACITY,
        }
    }
}
