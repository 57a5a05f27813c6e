//! companion-core: real-time voice session pipeline.
//!
//! Captures a microphone stream, slices it into analysis windows, runs
//! speech-to-text and vocal-mood inference, and publishes session state
//! and results to a presentation layer through an event sink.
//!
//! The binary target wires this library to JSON-line IPC on stdin/stdout;
//! embedders can instead drive [`session::SessionHandle`] directly and
//! supply their own [`ipc::EventSink`].

pub mod audio;
pub mod dsp;
pub mod inference;
pub mod ipc;
pub mod session;

pub use audio::capture::{list_devices, AudioDeviceInfo, CaptureDriver, CpalDriver};
pub use ipc::{EventSink, SessionCommand, SessionEvent};
pub use session::{Orchestrator, SessionConfig, SessionError, SessionHandle, SessionState};
