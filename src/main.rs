//! companion-core: voice session processing core.
//!
//! Communicates with the presentation layer via JSON-line IPC on
//! stdin/stdout. This entry point initializes the orchestrator and maps
//! incoming commands onto it, emitting a `command_result` reply for each
//! request/response command.

use tracing::info;
use tracing_subscriber::EnvFilter;

use companion_core::ipc::bridge::{spawn_stdin_reader, StdioSink};
use companion_core::ipc::{EventSink, SessionCommand, SessionEvent};
use companion_core::session::{Orchestrator, SessionConfig, SessionHandle};
use companion_core::{audio, CpalDriver};

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // Logs go to stderr; stdout is reserved for the event stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    StdioSink.emit(&SessionEvent::Starting {});

    let mut cmd_rx = spawn_stdin_reader();

    // Whisper model path comes from the environment; model management is
    // the host application's job. Unset (or feature compiled out) selects
    // the placeholder transcription backend.
    let model_path = std::env::var_os("COMPANION_WHISPER_MODEL").map(Into::into);
    let session = Orchestrator::spawn(Box::new(CpalDriver::new()), StdioSink, model_path);

    StdioSink.emit(&SessionEvent::Ready {});
    info!("companion core ready");

    while let Some(command) = cmd_rx.recv().await {
        if !handle_command(&session, command).await {
            break;
        }
    }

    session.shutdown().await;
    StdioSink.emit(&SessionEvent::Stopping {});
    info!("companion core shutting down");
}

/// Handle a single command from the presentation layer.
/// Returns `false` if the main loop should exit.
async fn handle_command(session: &SessionHandle, cmd: SessionCommand) -> bool {
    match cmd {
        SessionCommand::Ping {} => {
            StdioSink.emit(&SessionEvent::Pong {});
        }

        SessionCommand::StartSession {
            device,
            enable_transcription,
            enable_emotion,
        } => {
            let config = SessionConfig {
                device,
                enable_transcription,
                enable_emotion,
                ..SessionConfig::default()
            };
            emit_result("start_session", session.start_session(config).await);
        }

        SessionCommand::StopSession {} => {
            emit_result("stop_session", session.stop_session().await);
        }

        SessionCommand::GetSessionStatus {} => match session.status().await {
            Ok(status) => StdioSink.emit(&SessionEvent::SessionStatus { status }),
            Err(e) => emit_result("get_session_status", Err(e)),
        },

        SessionCommand::GetAvailableDevices {} => {
            StdioSink.emit(&SessionEvent::AudioDevices {
                devices: audio::capture::list_devices(),
            });
        }

        SessionCommand::Stop {} => {
            return false;
        }
    }

    true
}

fn emit_result(command: &str, result: Result<(), companion_core::SessionError>) {
    let (success, error) = match result {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    StdioSink.emit(&SessionEvent::CommandResult {
        command: command.to_string(),
        success,
        error,
    });
}
