//! Speech-to-text backends.
//!
//! Local whisper.cpp inference via whisper-rs, gated behind the `whisper`
//! cargo feature. When the feature is disabled (the default) or no model is
//! configured, transcription degrades to a well-defined placeholder result
//! rather than an error, so downstream consumers keep a uniform contract.

/// Text returned when no transcription backend is available.
pub const PLACEHOLDER_TEXT: &str = "[transcription unavailable]";

/// Always-available backend that stands in for a real STT engine.
pub struct PlaceholderStt;

impl PlaceholderStt {
    pub fn new() -> Self {
        Self
    }

    /// Returns the placeholder transcription with zero confidence.
    pub async fn transcribe(&self, _audio: &[f32]) -> anyhow::Result<(String, f32)> {
        Ok((PLACEHOLDER_TEXT.to_string(), 0.0))
    }
}

impl Default for PlaceholderStt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "whisper")]
mod inner {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tracing::info;
    use whisper_rs::{
        FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
    };

    /// Minimum audio duration in samples at 16 kHz (0.4 s). Shorter windows
    /// produce empty text instead of hallucinated tokens.
    const MIN_SAMPLES: usize = 6_400;

    /// Greedy whisper.cpp sampling does not expose a calibrated score;
    /// report a fixed estimate distinct from the placeholder's zero.
    const WHISPER_CONFIDENCE: f32 = 0.9;

    /// Number of threads for whisper.cpp inference. Half the available
    /// cores, capped 1..=8, leaving headroom for capture and the pipeline.
    fn inference_threads() -> i32 {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores / 2).clamp(1, 8) as i32
    }

    /// Holds the WhisperContext and a cached WhisperState.
    ///
    /// Caching the state avoids ~200 MB of buffer reallocation per call
    /// (`whisper_init_state` in whisper.cpp).
    struct WhisperInner {
        ctx: WhisperContext,
        cached_state: Option<WhisperState>,
    }

    // SAFETY: WhisperContext and WhisperState are safe to move between
    // threads when access is serialized via a Mutex.
    unsafe impl Send for WhisperInner {}
    unsafe impl Sync for WhisperInner {}

    pub struct WhisperStt {
        inner: Arc<Mutex<WhisperInner>>,
        n_threads: i32,
    }

    impl WhisperStt {
        /// Load a GGML whisper model from disk.
        pub fn new(model_path: &Path) -> anyhow::Result<Self> {
            if !model_path.exists() {
                anyhow::bail!("whisper model not found: {}", model_path.display());
            }
            let ctx = WhisperContext::new_with_params(
                model_path.to_str().unwrap_or_default(),
                WhisperContextParameters::default(),
            )
            .map_err(|e| anyhow::anyhow!("failed to load whisper model: {}", e))?;

            let n_threads = inference_threads();
            info!(
                model = %model_path.display(),
                threads = n_threads,
                "whisper model loaded"
            );
            Ok(Self {
                inner: Arc::new(Mutex::new(WhisperInner {
                    ctx,
                    cached_state: None,
                })),
                n_threads,
            })
        }

        /// Transcribe 16 kHz mono audio on a blocking thread.
        pub async fn transcribe(&self, audio: &[f32]) -> anyhow::Result<(String, f32)> {
            if audio.len() < MIN_SAMPLES {
                return Ok((String::new(), WHISPER_CONFIDENCE));
            }

            let audio = audio.to_vec();
            let inner = Arc::clone(&self.inner);
            let n_threads = self.n_threads;

            let text = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
                let mut guard = inner.lock().unwrap();
                let inner = &mut *guard;

                let state = match &mut inner.cached_state {
                    Some(s) => s,
                    slot => {
                        info!("creating whisper state (first transcription)");
                        let s = inner.ctx.create_state().map_err(|e| {
                            anyhow::anyhow!("failed to create whisper state: {}", e)
                        })?;
                        slot.insert(s)
                    }
                };

                let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
                params.set_language(Some("en"));
                params.set_n_threads(n_threads);
                params.set_print_special(false);
                params.set_print_progress(false);
                params.set_print_realtime(false);
                params.set_print_timestamps(false);
                params.set_single_segment(true);
                params.set_no_timestamps(true);
                params.set_suppress_non_speech_tokens(true);

                state
                    .full(params, &audio)
                    .map_err(|e| anyhow::anyhow!("whisper inference failed: {}", e))?;

                let num_segments = state
                    .full_n_segments()
                    .map_err(|e| anyhow::anyhow!("failed to get segment count: {}", e))?;
                let mut text = String::new();
                for i in 0..num_segments {
                    if let Ok(seg) = state.full_get_segment_text(i) {
                        text.push_str(seg.trim());
                        if i + 1 < num_segments {
                            text.push(' ');
                        }
                    }
                }
                Ok(text)
            })
            .await
            .map_err(|e| anyhow::anyhow!("whisper task panicked: {}", e))??;

            Ok((text, WHISPER_CONFIDENCE))
        }
    }
}

#[cfg(feature = "whisper")]
pub use inner::WhisperStt;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_returns_fixed_text_and_zero_confidence() {
        let stt = PlaceholderStt::new();
        let (text, confidence) = stt.transcribe(&[0.0; 1600]).await.unwrap();
        assert_eq!(text, PLACEHOLDER_TEXT);
        assert_eq!(confidence, 0.0);
    }
}
