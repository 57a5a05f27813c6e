//! IPC protocol types for communication with the presentation layer.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> core).

pub mod bridge;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::capture::AudioDeviceInfo;
use crate::inference::emotion::EmotionLabel;
use crate::session::SessionState;

// ---------------------------------------------------------------------------
// Events: core -> presentation layer (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the presentation layer as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`. Delivery is
/// fire-and-forget, at most once per logical occurrence.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Starting {},
    Ready {},
    Stopping {},
    Pong {},
    SessionStatusChanged {
        status: SessionState,
    },
    TranscriptionResult {
        text: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },
    EmotionResult {
        emotion: EmotionLabel,
        confidence: f32,
    },
    /// Non-fatal service degradation: buffer overflow, queue saturation,
    /// or an inference timeout. The session keeps running.
    Degraded {
        reason: String,
    },
    /// Reply to a request/response command.
    CommandResult {
        command: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SessionStatus {
        status: SessionState,
    },
    AudioDevices {
        devices: Vec<AudioDeviceInfo>,
    },
    Error {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Commands: presentation layer -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the presentation layer as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum SessionCommand {
    StartSession {
        #[serde(default)]
        device: Option<String>,
        #[serde(default = "default_enabled")]
        enable_transcription: bool,
        #[serde(default = "default_enabled")]
        enable_emotion: bool,
    },
    StopSession {},
    GetSessionStatus {},
    GetAvailableDevices {},
    Ping {},
    /// Shut down the core process.
    Stop {},
}

fn default_enabled() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Event sink
// ---------------------------------------------------------------------------

/// Abstract output the orchestrator publishes to: status changes,
/// transcription results, emotion results. The binary wires this to
/// stdout; tests collect events in memory.
pub trait EventSink: Send + 'static {
    fn emit(&self, event: &SessionEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag_and_data() {
        let event = SessionEvent::SessionStatusChanged {
            status: SessionState::Recording,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"session_status_changed","data":{"status":"recording"}}"#
        );
    }

    #[test]
    fn emotion_event_uses_lowercase_label() {
        let event = SessionEvent::EmotionResult {
            emotion: EmotionLabel::Angry,
            confidence: 0.4,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""emotion":"angry""#));
    }

    #[test]
    fn start_session_command_defaults_flags_on() {
        let cmd: SessionCommand =
            serde_json::from_str(r#"{"command": "start_session"}"#).unwrap();
        match cmd {
            SessionCommand::StartSession {
                device,
                enable_transcription,
                enable_emotion,
            } => {
                assert!(device.is_none());
                assert!(enable_transcription);
                assert!(enable_emotion);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn start_session_command_parses_device_and_flags() {
        let cmd: SessionCommand = serde_json::from_str(
            r#"{"command": "start_session", "device": "USB Mic", "enable_emotion": false}"#,
        )
        .unwrap();
        match cmd {
            SessionCommand::StartSession {
                device,
                enable_emotion,
                ..
            } => {
                assert_eq!(device.as_deref(), Some("USB Mic"));
                assert!(!enable_emotion);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
