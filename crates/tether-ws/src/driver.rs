//! Per-connection driver task.
//!
//! One task per active connection: open with a timeout, run the session
//! (outbound channel, inbound frames, heartbeat), and on loss sleep out the
//! backoff before trying again. Cancellation of the connection's token stops
//! it at any await point. The driver never touches the manager table.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tether_core::{ConnectionError, Envelope};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::dispatch::{Inbound, route};
use crate::state::{Effect, Trigger};
use crate::transport::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Frame, FrameSink, FrameStream};

/// How a session ended.
enum SessionEnd {
    Cancelled,
    Clean { reason: String },
    Lost { code: u16, reason: String, unsent: Vec<String> },
}

pub(crate) async fn run(
    conn: Arc<Connection>,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
) {
    let cancel = conn.cancel_token().clone();
    loop {
        let Some(url) = conn.url() else {
            return;
        };

        let attempt = tokio::select! {
            () = cancel.cancelled() => return,
            res = tokio::time::timeout(config.open_timeout, connector.connect(&url)) => match res {
                Ok(res) => res,
                Err(_) => Err(ConnectionError::OpenTimeout {
                    timeout_ms: u64::try_from(config.open_timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        };

        let effect = match attempt {
            Ok((mut sink, stream)) => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                if !conn.opened(tx) {
                    let _ = sink.send(close_frame()).await;
                    return;
                }
                match session(&conn, &config, sink, stream, &mut rx).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Clean { reason } => {
                        conn.ended(Trigger::ClosedClean, CLOSE_NORMAL, &reason, Vec::new(), Some(&mut rx))
                    }
                    SessionEnd::Lost { code, reason, unsent } => {
                        conn.ended(Trigger::Lost, code, &reason, unsent, Some(&mut rx))
                    }
                }
            }
            Err(error) => {
                warn!(key = conn.key(), url = %url, error = %error, "connection attempt failed");
                conn.ended(Trigger::Lost, CLOSE_ABNORMAL, &error.to_string(), Vec::new(), None)
            }
        };

        match effect {
            Effect::ScheduleRetry { delay, .. } => {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                if !conn.retry_elapsed() {
                    return;
                }
            }
            _ => return,
        }
    }
}

async fn session(
    conn: &Connection,
    config: &ConnectionConfig,
    mut sink: FrameSink,
    mut stream: FrameStream,
    rx: &mut mpsc::UnboundedReceiver<String>,
) -> SessionEnd {
    let cancel = conn.cancel_token().clone();
    let mut heartbeat = config.heartbeat_interval.map(heartbeat_timer);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                let _ = sink.send(close_frame()).await;
                let _ = sink.close().await;
                return SessionEnd::Cancelled;
            }

            Some(text) = rx.recv() => {
                if let Err(error) = sink.send(Frame::Text(text.clone())).await {
                    return SessionEnd::Lost {
                        code: CLOSE_ABNORMAL,
                        reason: error.to_string(),
                        unsent: vec![text],
                    };
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => match route(conn.key(), &text) {
                    Inbound::Reply(reply) => {
                        if let Err(error) = sink.send(Frame::Text(reply)).await {
                            return SessionEnd::Lost {
                                code: CLOSE_ABNORMAL,
                                reason: error.to_string(),
                                unsent: Vec::new(),
                            };
                        }
                    }
                    Inbound::Publish(batch) => {
                        for event in batch {
                            conn.publish(event);
                        }
                    }
                    Inbound::Ignore => {}
                },
                Some(Ok(Frame::Close { code: CLOSE_NORMAL, reason })) => {
                    return SessionEnd::Clean { reason };
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    return SessionEnd::Lost { code, reason, unsent: Vec::new() };
                }
                Some(Err(error)) => {
                    return SessionEnd::Lost {
                        code: CLOSE_ABNORMAL,
                        reason: error.to_string(),
                        unsent: Vec::new(),
                    };
                }
                None => {
                    return SessionEnd::Lost {
                        code: CLOSE_ABNORMAL,
                        reason: "stream ended".to_owned(),
                        unsent: Vec::new(),
                    };
                }
            },

            () = tick(&mut heartbeat) => {
                let ping = match Envelope::ping().to_json() {
                    Ok(ping) => ping,
                    Err(error) => {
                        warn!(key = conn.key(), error = %error, "failed to encode heartbeat");
                        heartbeat = None;
                        continue;
                    }
                };
                debug!(key = conn.key(), "heartbeat");
                if let Err(error) = sink.send(Frame::Text(ping)).await {
                    warn!(key = conn.key(), error = %error, "heartbeat send failed, stopping heartbeat");
                    heartbeat = None;
                }
            }
        }
    }
}

fn heartbeat_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn close_frame() -> Frame {
    Frame::Close {
        code: CLOSE_NORMAL,
        reason: "closed by client".to_owned(),
    }
}
