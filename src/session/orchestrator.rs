//! Session orchestrator: the lifecycle state machine and pipeline loop.
//!
//! A single tokio task owns `SessionState` and everything session-scoped.
//! It selects over three inputs: commands from the presentation layer,
//! a periodic pipeline tick that drains the ring buffer through DSP and
//! windowing, and completions from the inference worker. Nothing else may
//! touch the state; external queries receive snapshots over oneshot
//! channels.
//!
//! Cancellation policy on `stop_session` is drain: in-flight and queued
//! inference jobs complete, new dispatch is refused, and `Idle` is not
//! reported until every dispatched window has resolved.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::capture::{CaptureDriver, CaptureFormat};
use crate::audio::chunker::{AnalysisWindow, Chunker};
use crate::audio::ring_buffer::{sample_ring, AudioConsumer};
use crate::dsp::{self, LinearResampler, NoiseGate};
use crate::inference::{
    spawn_worker, EmotionBackend, InferenceAdapter, InferenceError, InferenceJob,
    InferenceOutcome, InferenceResult, JobKind, SttBackend, Transcription,
};
use crate::inference::Emotion;
use crate::ipc::{EventSink, SessionEvent};

use super::{SessionConfig, SessionError, SessionState};

/// Pipeline cadence: how often the ring buffer is drained.
const PIPELINE_TICK: Duration = Duration::from_millis(20);

/// Read block size when draining the ring buffer.
const DRAIN_BLOCK: usize = 4096;

/// Target peak for per-window normalization.
const WINDOW_PEAK_TARGET: f32 = 0.9;

/// Command channel depth. Commands are rare; a small bound suffices.
const COMMAND_QUEUE: usize = 16;

enum Command {
    Start {
        config: SessionConfig,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Status {
        reply: oneshot::Sender<SessionState>,
    },
    Shutdown,
}

/// Cloneable handle for driving the orchestrator task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Start a session with the given configuration. Rejected with
    /// `InvalidTransition` when a session is already active and with
    /// `DeviceUnavailable` when the device cannot be opened.
    pub async fn start_session(&self, config: SessionConfig) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Start { config, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Stop the active session. An idempotent success no-op from `Idle`.
    pub async fn stop_session(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stop { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Snapshot of the current session state. Never mutates anything.
    pub async fn status(&self) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Shut the orchestrator task down. Stops capture if running.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

/// Everything scoped to one recording session.
struct ActiveSession {
    epoch: u64,
    config: SessionConfig,
    format: CaptureFormat,
    consumer: AudioConsumer,
    resampler: LinearResampler,
    gate: NoiseGate,
    chunker: Chunker,
    /// Worker input; dropped on stop so the worker drains and exits.
    job_tx: Option<mpsc::Sender<InferenceJob>>,
    /// Jobs accepted for dispatch but not yet handed to the worker.
    staged: VecDeque<InferenceJob>,
    /// Dispatched jobs that have not produced an outcome yet. Counts
    /// staged jobs too: once a window is accepted it must resolve.
    pending: usize,
    /// Most recent result of each kind; discarded at session end.
    last_transcription: Option<Transcription>,
    last_emotion: Option<Emotion>,
    degraded_reported: bool,
    overflow_seen: u64,
    dropped_emotion_jobs: u64,
    scratch: Vec<f32>,
}

/// The session orchestrator. Owns the state machine, drives the pipeline,
/// and publishes every transition and result to the event sink.
pub struct Orchestrator<S: EventSink> {
    state: SessionState,
    epoch: u64,
    driver: Box<dyn CaptureDriver>,
    sink: S,
    stt: Arc<SttBackend>,
    active: Option<ActiveSession>,
    result_tx: mpsc::UnboundedSender<InferenceOutcome>,
}

impl<S: EventSink> Orchestrator<S> {
    /// Spawn the orchestrator task and return a handle to it.
    ///
    /// `model_path` points at a whisper GGML model; `None` (or a missing
    /// model, or the `whisper` feature compiled out) selects the
    /// placeholder transcription backend.
    pub fn spawn(
        driver: Box<dyn CaptureDriver>,
        sink: S,
        model_path: Option<PathBuf>,
    ) -> SessionHandle {
        Self::spawn_with_stt(
            driver,
            sink,
            Arc::new(SttBackend::detect(model_path.as_deref())),
        )
    }

    fn spawn_with_stt(driver: Box<dyn CaptureDriver>, sink: S, stt: Arc<SttBackend>) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator {
            state: SessionState::Idle,
            epoch: 0,
            driver,
            sink,
            stt,
            active: None,
            result_tx,
        };
        tokio::spawn(orchestrator.run(cmd_rx, result_rx));
        SessionHandle { tx: cmd_tx }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut result_rx: mpsc::UnboundedReceiver<InferenceOutcome>,
    ) {
        let mut tick = tokio::time::interval(PIPELINE_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Start { config, reply }) => {
                        let _ = reply.send(self.start_session(config));
                    }
                    Some(Command::Stop { reply }) => {
                        let _ = reply.send(self.stop_session().await);
                    }
                    Some(Command::Status { reply }) => {
                        let _ = reply.send(self.state);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(outcome) = result_rx.recv() => {
                    self.handle_outcome(outcome);
                }
                _ = tick.tick() => {
                    self.on_tick();
                }
            }
        }

        self.driver.stop();
        debug!("orchestrator task exiting");
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        info!(state = %state, "session state changed");
        self.sink
            .emit(&SessionEvent::SessionStatusChanged { status: state });
    }

    /// `Idle -> Recording`. Opens capture, builds the per-session pipeline,
    /// and spawns the inference worker.
    fn start_session(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "start_session",
            });
        }

        // Capacity must absorb worst-case consumer jitter: at least 4x the
        // window duration at the device's highest plausible rate.
        let window_samples =
            (config.sample_rate as u64 * config.window_ms as u64 / 1000).max(1) as usize;
        let capacity = config.ring_capacity.max(window_samples * 4);
        let (producer, consumer) = sample_ring(Some(capacity));

        // No state change if the device is unavailable.
        let format = self.driver.start(config.device.as_deref(), producer)?;

        self.epoch += 1;
        let session_start = Utc::now();

        let adapter = Arc::new(InferenceAdapter::new(
            self.stt.clone(),
            EmotionBackend::heuristic(),
            Duration::from_millis(config.transcription_timeout_ms),
        ));
        let (job_tx, job_rx) = mpsc::channel(config.max_inference_queue.max(1));
        spawn_worker(adapter, job_rx, self.result_tx.clone());

        self.active = Some(ActiveSession {
            epoch: self.epoch,
            format,
            consumer,
            resampler: LinearResampler::new(format.sample_rate, config.sample_rate),
            gate: NoiseGate::new(config.silence_threshold),
            chunker: Chunker::new(
                config.sample_rate,
                config.window_ms,
                config.overlap,
                session_start,
            ),
            job_tx: Some(job_tx),
            staged: VecDeque::new(),
            pending: 0,
            last_transcription: None,
            last_emotion: None,
            degraded_reported: false,
            overflow_seen: 0,
            dropped_emotion_jobs: 0,
            scratch: vec![0.0; DRAIN_BLOCK],
            config,
        });

        info!(epoch = self.epoch, "session started");
        self.set_state(SessionState::Recording);
        Ok(())
    }

    /// `Recording -> Processing`, then automatically to `Idle` once every
    /// dispatched inference call has resolved. From `Idle` or `Processing`
    /// this is a success no-op.
    async fn stop_session(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Processing => return Ok(()),
            SessionState::Recording => {}
        }

        self.driver.stop();

        // Pull whatever capture produced before it stopped, then flush the
        // trailing partial window so the final audio is not lost.
        self.drain_pipeline();
        if let Some(active) = self.active.as_mut() {
            if let Some(window) = active.chunker.flush() {
                debug!(seq = window.seq, len = window.samples.len(), "flushed final window");
                Self::stage_window(active, window);
            }
        }

        self.set_state(SessionState::Processing);

        // Hand every staged job to the worker (suspending on a full queue
        // is fine here; capture has stopped), then close the queue so the
        // worker drains and exits.
        let mut drained = true;
        if let Some(active) = self.active.as_mut() {
            if let Some(job_tx) = active.job_tx.take() {
                while let Some(job) = active.staged.pop_front() {
                    if job_tx.send(job).await.is_err() {
                        warn!("inference worker gone before drain completed");
                        active.pending = 0;
                        break;
                    }
                }
            }
            drained = active.pending == 0;
        }
        if drained {
            self.finish_session();
        }

        Ok(())
    }

    /// `Processing -> Idle`: the only automatic transition.
    fn finish_session(&mut self) {
        if let Some(active) = self.active.take() {
            if active.dropped_emotion_jobs > 0 {
                info!(
                    dropped = active.dropped_emotion_jobs,
                    "emotion jobs shed under backpressure this session"
                );
            }
            info!(
                last_transcription = active.last_transcription.map(|t| t.window_seq),
                last_emotion = active.last_emotion.map(|e| e.window_seq),
                "session results drained"
            );
        }
        self.set_state(SessionState::Idle);
    }

    /// Periodic pipeline work: drain the ring, run DSP, window, dispatch.
    fn on_tick(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }
        self.drain_pipeline();
        self.flush_staged();
    }

    /// Ring buffer -> downmix -> resample -> gate -> windows -> staging.
    fn drain_pipeline(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let mut canonical = Vec::new();
        loop {
            let n = active.consumer.read(&mut active.scratch);
            if n == 0 {
                break;
            }
            let mono = dsp::downmix(&active.scratch[..n], active.format.channels);
            active.resampler.process(&mono, &mut canonical);
        }

        // Overflow is non-fatal: count it, surface it, keep going.
        let overflow = active.consumer.overflow_count();
        if overflow > active.overflow_seen {
            let dropped = overflow - active.overflow_seen;
            active.overflow_seen = overflow;
            warn!(dropped, "ring buffer overflow, oldest samples lost");
            self.sink.emit(&SessionEvent::Degraded {
                reason: format!("audio buffer overflow: {dropped} samples dropped"),
            });
        }

        if canonical.is_empty() {
            return;
        }
        active.gate.process(&mut canonical);

        let mut windows = Vec::new();
        active.chunker.push(&canonical, &mut windows);
        for window in windows {
            Self::stage_window(active, window);
        }
        self.flush_staged();
    }

    /// Normalize a completed window and queue its inference jobs according
    /// to the enabled feature flags.
    fn stage_window(active: &mut ActiveSession, mut window: AnalysisWindow) {
        dsp::remove_dc_offset(&mut window.samples);
        dsp::normalize_peak(&mut window.samples, WINDOW_PEAK_TARGET);

        let window = Arc::new(window);
        if active.config.enable_transcription {
            active.staged.push_back(InferenceJob {
                epoch: active.epoch,
                kind: JobKind::Transcribe,
                window: window.clone(),
            });
            active.pending += 1;
        }
        if active.config.enable_emotion {
            active.staged.push_back(InferenceJob {
                epoch: active.epoch,
                kind: JobKind::Emotion,
                window,
            });
            active.pending += 1;
        }
    }

    /// Move staged jobs into the worker queue without blocking the control
    /// loop. On a saturated queue, emotion jobs are shed oldest-first
    /// (best effort, low value per loss); transcription jobs are never
    /// dropped; a degraded-service event is emitted instead and the jobs
    /// wait for the queue to clear.
    fn flush_staged(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(job_tx) = active.job_tx.clone() else {
            return;
        };

        while let Some(job) = active.staged.pop_front() {
            match job_tx.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    active.staged.push_front(job);

                    if active.staged.len() > active.config.max_inference_queue {
                        if let Some(pos) =
                            active.staged.iter().position(|j| j.kind == JobKind::Emotion)
                        {
                            let dropped = active.staged.remove(pos).expect("position valid");
                            active.pending = active.pending.saturating_sub(1);
                            active.dropped_emotion_jobs += 1;
                            debug!(
                                seq = dropped.window.seq,
                                "shed oldest emotion job under backpressure"
                            );
                            continue;
                        }
                    }

                    if !active.degraded_reported {
                        active.degraded_reported = true;
                        warn!("inference queue saturated, transcription is falling behind");
                        self.sink.emit(&SessionEvent::Degraded {
                            reason: "inference queue saturated".to_string(),
                        });
                    }
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("inference worker gone, discarding staged jobs");
                    active.pending = active.pending.saturating_sub(active.staged.len() + 1);
                    active.staged.clear();
                    break;
                }
            }
        }
    }

    /// Attribute one completion, forward it to the sink, and finish the
    /// session if it was the last pending job of a stopping session.
    fn handle_outcome(&mut self, outcome: InferenceOutcome) {
        let Some(active) = self.active.as_mut() else {
            debug!(seq = outcome.window_seq, "late result with no session, discarded");
            return;
        };
        if outcome.epoch != active.epoch {
            // Result from before a session restart.
            debug!(
                epoch = outcome.epoch,
                seq = outcome.window_seq,
                "stale result discarded"
            );
            return;
        }

        active.pending = active.pending.saturating_sub(1);

        match outcome.result {
            Ok(InferenceResult::Transcription(t)) => {
                self.sink.emit(&SessionEvent::TranscriptionResult {
                    text: t.text.clone(),
                    confidence: t.confidence,
                    timestamp: outcome.window_timestamp,
                });
                active.last_transcription = Some(t);
            }
            Ok(InferenceResult::Emotion(e)) => {
                self.sink.emit(&SessionEvent::EmotionResult {
                    emotion: e.label,
                    confidence: e.confidence,
                });
                active.last_emotion = Some(e);
            }
            Err(InferenceError::Timeout) => {
                warn!(seq = outcome.window_seq, "transcription timed out");
                self.sink.emit(&SessionEvent::Degraded {
                    reason: format!("transcription timeout for window {}", outcome.window_seq),
                });
            }
            Err(e) => {
                warn!(seq = outcome.window_seq, error = %e, "inference failed");
            }
        }

        if self.state == SessionState::Processing {
            let drained = self
                .active
                .as_ref()
                .map(|a| a.pending == 0 && a.staged.is_empty())
                .unwrap_or(true);
            if drained {
                self.finish_session();
            }
        }
    }
}
