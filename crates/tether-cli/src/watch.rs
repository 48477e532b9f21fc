//! `tether watch`: follow one channel and print its events.

use anyhow::Result;
use tether_settings::TetherSettings;
use tether_ws::{Channel, ConnectionEvent, ConnectionManager, channel_url};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub(crate) async fn run(settings: &TetherSettings, item: Option<String>) -> Result<()> {
    let channel = item.map_or(Channel::Server, Channel::Item);
    let url = channel_url(&settings.http.base_url, &channel)?;

    let manager = ConnectionManager::from_settings(&settings.connection);
    let mut events = manager.subscribe();
    let _handle = manager.connect(&channel.key(), &url);
    eprintln!("watching {url} (Ctrl-C to stop)");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        println!("{line}");
                    }
                    if matches!(event, ConnectionEvent::Failed { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.close_all();
    Ok(())
}

/// One output line per event; `None` for events that are only noise here.
fn describe(event: &ConnectionEvent) -> Option<String> {
    let line = match event {
        ConnectionEvent::StatusChanged { .. } | ConnectionEvent::Message { .. } => return None,
        ConnectionEvent::Connected { key } => format!("[{key}] connected"),
        ConnectionEvent::Disconnected { key, code, reason } => {
            format!("[{key}] disconnected ({code}) {reason}")
        }
        ConnectionEvent::Reconnecting {
            key,
            attempt,
            delay,
        } => format!("[{key}] reconnecting in {}ms (attempt {attempt})", delay.as_millis()),
        ConnectionEvent::Failed { key, attempts } => {
            format!("[{key}] gave up after {attempts} attempts")
        }
        ConnectionEvent::ItemUpdated { key, payload } => format!(
            "[{key}] item-updated {} {}",
            payload.name,
            payload.status.as_deref().unwrap_or("-")
        ),
        ConnectionEvent::ExecutionStarted { key, payload } => {
            format!("[{key}] execution-started {}", payload.name)
        }
        ConnectionEvent::ExecutionCompleted { key, payload } => match payload.duration_ms {
            Some(ms) => format!("[{key}] execution-completed {} in {ms}ms", payload.name),
            None => format!("[{key}] execution-completed {}", payload.name),
        },
        ConnectionEvent::ExecutionFailed { key, payload } => {
            format!("[{key}] execution-failed {}: {}", payload.name, payload.error)
        }
        ConnectionEvent::ServerStatusChanged { key, payload } => {
            format!("[{key}] server {}", payload.status)
        }
        ConnectionEvent::FileChanged { key, payload } => {
            format!("[{key}] file {:?} {}", payload.change, payload.path)
        }
        ConnectionEvent::ServerError { key, payload } => {
            format!("[{key}] error: {}", payload.message)
        }
        ConnectionEvent::UnknownMessage { key, envelope } => {
            format!("[{key}] unknown message type '{}'", envelope.message_type)
        }
        ConnectionEvent::ProtocolError { key, error } => format!("[{key}] bad frame: {error}"),
        ConnectionEvent::MessageDropped { key, .. } => format!("[{key}] outbound message dropped"),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::messages::ExecutionFailed;

    #[test]
    fn lifecycle_lines() {
        let line = describe(&ConnectionEvent::Reconnecting {
            key: "server".into(),
            attempt: 2,
            delay: Duration::from_millis(2000),
        });
        assert_eq!(line.as_deref(), Some("[server] reconnecting in 2000ms (attempt 2)"));
    }

    #[test]
    fn generic_message_is_not_printed() {
        let status = ConnectionEvent::StatusChanged {
            key: "server".into(),
            from: tether_ws::ConnectionStatus::Connecting,
            to: tether_ws::ConnectionStatus::Connected,
        };
        assert!(describe(&status).is_none());
    }

    #[test]
    fn typed_message_line() {
        let line = describe(&ConnectionEvent::ExecutionFailed {
            key: "items/deck".into(),
            payload: ExecutionFailed {
                name: "deck".into(),
                execution_id: None,
                error: "boom".into(),
            },
        });
        assert_eq!(line.as_deref(), Some("[items/deck] execution-failed deck: boom"));
    }
}
