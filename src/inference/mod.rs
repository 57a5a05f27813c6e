//! Inference adapters and the dedicated inference worker.
//!
//! Uniform interface over the speech-to-text and vocal-mood analyzers,
//! invoked once per analysis window. Enum dispatch over backends avoids
//! dyn-compatibility issues with async methods and keeps the door open for
//! a trained emotion model to replace the heuristic without touching the
//! orchestrator contract.

pub mod emotion;
pub mod whisper;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::audio::AnalysisWindow;
use emotion::{EmotionLabel, HeuristicClassifier};

#[derive(Debug, Error)]
pub enum InferenceError {
    /// The call exceeded its configured time bound. Per-window, non-fatal.
    #[error("inference timed out")]
    Timeout,
    /// Backend not compiled in or not configured.
    #[error("inference backend unavailable")]
    Unavailable,
    #[error("inference backend error: {0}")]
    Backend(String),
}

/// Speech-to-text output for one window.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
    pub window_seq: u64,
}

/// Vocal-mood output for one window.
#[derive(Debug, Clone)]
pub struct Emotion {
    pub label: EmotionLabel,
    pub confidence: f32,
    pub window_seq: u64,
}

/// One inference result, attributed to its window by sequence number.
/// Consumed exactly once by the orchestrator.
#[derive(Debug, Clone)]
pub enum InferenceResult {
    Transcription(Transcription),
    Emotion(Emotion),
}

/// Enum-dispatch wrapper over the STT backends.
pub enum SttBackend {
    #[cfg(feature = "whisper")]
    Whisper(whisper::WhisperStt),
    Placeholder(whisper::PlaceholderStt),
    /// Test-only backend that sleeps before answering, for exercising the
    /// transcription timeout path.
    #[cfg(test)]
    Slow(Duration),
}

impl SttBackend {
    /// Build the best available backend. Whisper when compiled in and a
    /// model path is configured; the placeholder otherwise.
    pub fn detect(model_path: Option<&std::path::Path>) -> Self {
        #[cfg(feature = "whisper")]
        if let Some(path) = model_path {
            match whisper::WhisperStt::new(path) {
                Ok(stt) => return Self::Whisper(stt),
                Err(e) => {
                    tracing::warn!("whisper unavailable, using placeholder: {e}");
                }
            }
        }
        #[cfg(not(feature = "whisper"))]
        let _ = model_path;
        Self::Placeholder(whisper::PlaceholderStt::new())
    }

    async fn transcribe(&self, audio: &[f32]) -> Result<(String, f32), InferenceError> {
        match self {
            #[cfg(feature = "whisper")]
            Self::Whisper(stt) => stt
                .transcribe(audio)
                .await
                .map_err(|e| InferenceError::Backend(e.to_string())),
            Self::Placeholder(stt) => stt
                .transcribe(audio)
                .await
                .map_err(|e| InferenceError::Backend(e.to_string())),
            #[cfg(test)]
            Self::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(("slow transcription".to_string(), 1.0))
            }
        }
    }
}

/// Pluggable emotion strategy. Currently only the feature heuristic; a
/// trained model slots in as a new variant.
pub enum EmotionBackend {
    Heuristic(HeuristicClassifier),
}

impl EmotionBackend {
    pub fn heuristic() -> Self {
        Self::Heuristic(HeuristicClassifier::new())
    }

    fn classify(&self, samples: &[f32], sample_rate: u32) -> emotion::EmotionScore {
        match self {
            Self::Heuristic(c) => c.classify(samples, sample_rate),
        }
    }
}

/// Uniform interface wrapping both analyzers, invoked per window.
///
/// The STT backend is shared across sessions (model loading is expensive);
/// the adapter itself is rebuilt per session with that session's timeout.
pub struct InferenceAdapter {
    stt: Arc<SttBackend>,
    emotion: EmotionBackend,
    transcription_timeout: Duration,
}

impl InferenceAdapter {
    pub fn new(
        stt: Arc<SttBackend>,
        emotion: EmotionBackend,
        transcription_timeout: Duration,
    ) -> Self {
        Self {
            stt,
            emotion,
            transcription_timeout,
        }
    }

    /// Transcribe one window. Slow calls are bounded by the configured
    /// timeout; exceeding it yields `InferenceError::Timeout`.
    pub async fn transcribe(&self, window: &AnalysisWindow) -> Result<Transcription, InferenceError> {
        let (text, confidence) =
            tokio::time::timeout(self.transcription_timeout, self.stt.transcribe(&window.samples))
                .await
                .map_err(|_| InferenceError::Timeout)??;
        Ok(Transcription {
            text,
            confidence,
            window_seq: window.seq,
        })
    }

    /// Classify the vocal mood of one window. Pure and fast; runs inline
    /// on the worker.
    pub fn classify_emotion(&self, window: &AnalysisWindow) -> Result<Emotion, InferenceError> {
        let score = self.emotion.classify(&window.samples, window.sample_rate);
        Ok(Emotion {
            label: score.label,
            confidence: score.confidence,
            window_seq: window.seq,
        })
    }
}

/// What a queued inference job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Transcribe,
    Emotion,
}

/// One unit of work for the inference worker.
pub struct InferenceJob {
    /// Session epoch the job belongs to; results from stale epochs are
    /// discarded by the orchestrator.
    pub epoch: u64,
    pub kind: JobKind,
    pub window: Arc<AnalysisWindow>,
}

/// Completion message sent back to the orchestrator. Completion order is
/// not guaranteed to match dispatch order; attribution is by sequence.
pub struct InferenceOutcome {
    pub epoch: u64,
    pub window_seq: u64,
    /// Wall-clock timestamp of the window's first sample.
    pub window_timestamp: chrono::DateTime<chrono::Utc>,
    pub kind: JobKind,
    pub result: Result<InferenceResult, InferenceError>,
}

/// Spawn the dedicated inference worker for one session.
///
/// Executes jobs in dispatch order so a slow transcription never reorders
/// results within a kind. The worker drains its queue after the sender is
/// dropped, which is what lets `stop_session` guarantee every dispatched
/// window resolves before the session reports `Idle`.
pub fn spawn_worker(
    adapter: Arc<InferenceAdapter>,
    mut job_rx: mpsc::Receiver<InferenceJob>,
    result_tx: mpsc::UnboundedSender<InferenceOutcome>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = job_rx.recv().await {
            let result = match job.kind {
                JobKind::Transcribe => adapter
                    .transcribe(&job.window)
                    .await
                    .map(InferenceResult::Transcription),
                JobKind::Emotion => adapter
                    .classify_emotion(&job.window)
                    .map(InferenceResult::Emotion),
            };
            let outcome = InferenceOutcome {
                epoch: job.epoch,
                window_seq: job.window.seq,
                window_timestamp: job.window.timestamp,
                kind: job.kind,
                result,
            };
            if result_tx.send(outcome).is_err() {
                break; // orchestrator gone
            }
        }
        debug!("inference worker exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn window(samples: Vec<f32>, seq: u64) -> AnalysisWindow {
        AnalysisWindow {
            samples,
            sample_rate: 16_000,
            seq,
            timestamp: Utc::now(),
            short: false,
        }
    }

    fn placeholder_adapter() -> InferenceAdapter {
        InferenceAdapter::new(
            Arc::new(SttBackend::Placeholder(whisper::PlaceholderStt::new())),
            EmotionBackend::heuristic(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn slow_transcription_exceeding_the_bound_times_out() {
        let adapter = InferenceAdapter::new(
            Arc::new(SttBackend::Slow(Duration::from_millis(200))),
            EmotionBackend::heuristic(),
            Duration::from_millis(10),
        );
        let err = adapter
            .transcribe(&window(vec![0.0; 1600], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout));
    }

    #[tokio::test]
    async fn placeholder_transcription_carries_window_seq() {
        let adapter = placeholder_adapter();
        let t = adapter.transcribe(&window(vec![0.0; 1600], 7)).await.unwrap();
        assert_eq!(t.window_seq, 7);
        assert_eq!(t.text, whisper::PLACEHOLDER_TEXT);
    }

    #[tokio::test]
    async fn worker_resolves_every_job_in_order() {
        let adapter = Arc::new(placeholder_adapter());
        let (job_tx, job_rx) = mpsc::channel(16);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let handle = spawn_worker(adapter, job_rx, result_tx);

        for seq in 0..10u64 {
            job_tx
                .send(InferenceJob {
                    epoch: 1,
                    kind: JobKind::Transcribe,
                    window: Arc::new(window(vec![0.0; 1600], seq)),
                })
                .await
                .unwrap();
        }
        drop(job_tx);

        let mut seqs = Vec::new();
        while let Some(outcome) = result_rx.recv().await {
            assert!(outcome.result.is_ok());
            seqs.push(outcome.window_seq);
        }
        assert_eq!(seqs, (0..10).collect::<Vec<_>>());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn emotion_job_yields_emotion_result() {
        let adapter = Arc::new(placeholder_adapter());
        let (job_tx, job_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        spawn_worker(adapter, job_rx, result_tx);

        job_tx
            .send(InferenceJob {
                epoch: 3,
                kind: JobKind::Emotion,
                window: Arc::new(window(vec![0.0; 1600], 0)),
            })
            .await
            .unwrap();
        drop(job_tx);

        let outcome = result_rx.recv().await.unwrap();
        assert_eq!(outcome.epoch, 3);
        assert!(matches!(
            outcome.result,
            Ok(InferenceResult::Emotion(_))
        ));
    }
}
