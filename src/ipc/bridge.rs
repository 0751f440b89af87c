//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread sends deserialized commands through an
//! mpsc channel; events go out as JSON lines on stdout.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{EngineCommand, EngineEvent};

/// Emit an `EngineEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &EngineEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Ignore write/flush errors; the pipe may be closed.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Convenience helper for emitting error events.
pub fn emit_error(message: &str) {
    emit_event(&EngineEvent::Error {
        message: message.to_string(),
    });
}

/// Normalize incoming JSON: if it has a `"type"` field but no `"command"`
/// field, rename `"type"` to `"command"` so serde can deserialize it.
fn normalize_command_json(input: &str) -> String {
    if let Ok(mut obj) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(input)
    {
        if !obj.contains_key("command") {
            if let Some(type_val) = obj.remove("type") {
                obj.insert("command".to_string(), type_val);
                if let Ok(json) = serde_json::to_string(&obj) {
                    return json;
                }
            }
        }
    }
    input.to_string()
}

/// Parse one command line, accepting `"type"` in place of `"command"`.
pub fn parse_command(line: &str) -> Result<EngineCommand, serde_json::Error> {
    serde_json::from_str(&normalize_command_json(line))
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `EngineCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (parent process gone) or on
/// unrecoverable read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<EngineCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = std::thread::Builder::new()
        .name("promptdj-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            let reader = stdin.lock();
            for line in reader.lines() {
                match line {
                    Ok(text) => {
                        let trimmed = text.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match parse_command(trimmed) {
                            Ok(cmd) => {
                                debug!(?cmd, "Received command");
                                if tx.send(cmd).is_err() {
                                    break; // Receiver dropped, main task is gone.
                                }
                            }
                            Err(e) => {
                                error!("Invalid JSON command: {} (input: {})", e, trimmed);
                                emit_error(&format!("Invalid JSON command: {}", e));
                            }
                        }
                    }
                    Err(e) => {
                        error!("stdin read error: {}", e);
                        break; // stdin closed
                    }
                }
            }
            debug!("stdin reader thread exiting");
        });

    // On failure the sender is dropped with the closure, so the receiver
    // reports a closed channel and the engine shuts down.
    if let Err(e) = spawned {
        error!("Failed to spawn stdin reader: {}", e);
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_is_normalized_to_command() {
        assert!(matches!(
            parse_command(r#"{"type": "ping"}"#),
            Ok(EngineCommand::Ping {})
        ));
        let cmd = parse_command(r#"{"type": "set_midi_device", "id": "port-1"}"#).unwrap();
        assert!(matches!(cmd, EngineCommand::SetMidiDevice { ref id } if id == "port-1"));
    }

    #[test]
    fn test_command_field_wins_over_type() {
        let cmd = parse_command(r#"{"command": "play", "type": "ignored"}"#).unwrap();
        assert!(matches!(cmd, EngineCommand::Play {}));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_command("not json").is_err());
        assert_eq!(normalize_command_json("not json"), "not json");
    }
}
