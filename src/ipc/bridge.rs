//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread sends deserialized commands through an
//! mpsc channel, and `StdioSink` writes JSON-line events to stdout.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{EventSink, SessionCommand, SessionEvent};

/// Event sink that writes JSON lines to stdout and flushes per event.
pub struct StdioSink;

impl EventSink for StdioSink {
    fn emit(&self, event: &SessionEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                eprintln!("failed to serialize event: {e}");
                return;
            }
        };
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        // Ignore write/flush errors; the pipe may be closed.
        let _ = writeln!(handle, "{json}");
        let _ = handle.flush();
    }
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `SessionCommand`, and forwards them through the returned
/// channel.
///
/// The thread exits when stdin is closed (parent process gone) or on
/// unrecoverable read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<SessionCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<SessionCommand>(trimmed) {
                        Ok(cmd) => {
                            debug!(?cmd, "received command");
                            if tx.send(cmd).is_err() {
                                break; // receiver dropped, main task is gone
                            }
                        }
                        Err(e) => {
                            error!("invalid JSON command: {e}, input: {trimmed}");
                            StdioSink.emit(&SessionEvent::Error {
                                message: format!("invalid JSON command: {e}"),
                            });
                        }
                    }
                }
                Err(e) => {
                    error!("stdin read error: {e}");
                    break; // stdin closed
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}
