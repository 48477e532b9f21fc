//! Shared state of one keyed connection.
//!
//! A [`Connection`] is owned jointly by the manager table and its driver
//! task. All mutation happens under one short `parking_lot` lock that is
//! never held across an `.await`; every status change funnels through
//! [`Connection::apply_locked`], which is also the only place that emits
//! lifecycle events and clears the outbound sender. That keeps "frames go
//! to the socket only while Connected" true by construction.

use metrics::counter;
use parking_lot::Mutex;
use tether_core::BackoffPolicy;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::ConnectionEvent;
use crate::queue::OutboundQueue;
use crate::state::{ConnectionState, ConnectionStatus, Effect, Trigger};
use crate::transport::CLOSE_NORMAL;

struct Inner {
    machine: ConnectionState,
    queue: OutboundQueue,
    url: Option<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

pub(crate) struct Connection {
    key: String,
    policy: BackoffPolicy,
    inner: Mutex<Inner>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    cancel: CancellationToken,
}

impl Connection {
    pub(crate) fn new(
        key: String,
        policy: BackoffPolicy,
        queue_capacity: usize,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            key,
            policy,
            inner: Mutex::new(Inner {
                machine: ConnectionState::default(),
                queue: OutboundQueue::new(queue_capacity),
                url: None,
                outbound: None,
            }),
            status,
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.inner.lock().machine.status()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn url(&self) -> Option<String> {
        self.inner.lock().url.clone()
    }

    pub(crate) fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Caller-requested connect. Returns `true` when a driver must be
    /// spawned; `false` when an attempt is already underway or open.
    pub(crate) fn connect(&self, url: &str) -> bool {
        let mut inner = self.inner.lock();
        if matches!(
            inner.machine.status(),
            ConnectionStatus::Disconnected | ConnectionStatus::Failed
        ) {
            inner.url = Some(url.to_owned());
        }
        self.apply_locked(&mut inner, Trigger::Connect, None) == Effect::Open
    }

    /// The socket opened. Flushes the queue into `tx` ahead of anything sent
    /// afterwards, then routes new sends straight to `tx`. Returns `false` if
    /// the connection is no longer expecting an open.
    pub(crate) fn opened(&self, tx: mpsc::UnboundedSender<String>) -> bool {
        let mut inner = self.inner.lock();
        if self.apply_locked(&mut inner, Trigger::Opened, None) != Effect::StartSession {
            return false;
        }
        let backlog = inner.queue.drain();
        if !backlog.is_empty() {
            debug!(key = %self.key, frames = backlog.len(), "flushing outbound queue");
        }
        for frame in backlog {
            let _ = tx.send(frame);
        }
        inner.outbound = Some(tx);
        true
    }

    /// The attempt or session ended. `unsent` is whatever the driver took
    /// off the channel but could not write; together with anything still in
    /// `rx` it goes back to the front of the queue.
    pub(crate) fn ended(
        &self,
        trigger: Trigger,
        code: u16,
        reason: &str,
        unsent: Vec<String>,
        rx: Option<&mut mpsc::UnboundedReceiver<String>>,
    ) -> Effect {
        let mut inner = self.inner.lock();
        inner.outbound = None;
        if self.cancel.is_cancelled() {
            return Effect::Stop;
        }

        let mut pending = unsent;
        if let Some(rx) = rx {
            while let Ok(frame) = rx.try_recv() {
                pending.push(frame);
            }
        }
        for frame in inner.queue.restore(pending) {
            self.dropped(frame);
        }

        self.apply_locked(&mut inner, trigger, Some((code, reason)))
    }

    /// The backoff delay elapsed. Returns `true` if a new attempt should start.
    pub(crate) fn retry_elapsed(&self) -> bool {
        let mut inner = self.inner.lock();
        self.apply_locked(&mut inner, Trigger::RetryElapsed, None) == Effect::Open
    }

    /// Send now if open, otherwise queue.
    pub(crate) fn enqueue(&self, frame: String) {
        let mut inner = self.inner.lock();
        let frame = match inner.outbound.as_ref() {
            Some(tx) => match tx.send(frame) {
                Ok(()) => return,
                Err(mpsc::error::SendError(frame)) => frame,
            },
            None => frame,
        };
        if let Some(evicted) = inner.queue.push(frame) {
            self.dropped(evicted);
        }
    }

    /// Caller-requested close: stop the driver, drop the queue, and settle
    /// as Disconnected with a normal close code.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
        let mut inner = self.inner.lock();
        inner.queue.clear();
        let _ = self.apply_locked(&mut inner, Trigger::Close, Some((CLOSE_NORMAL, "closed by client")));
    }

    fn apply_locked(
        &self,
        inner: &mut Inner,
        trigger: Trigger,
        close: Option<(u16, &str)>,
    ) -> Effect {
        let t = inner.machine.apply(trigger, &self.policy);
        if t.to != ConnectionStatus::Connected {
            inner.outbound = None;
        }
        if !t.changed() && t.effect == Effect::None {
            return t.effect;
        }

        if t.changed() {
            debug!(key = %self.key, from = %t.from, to = %t.to, ?trigger, "connection status");
            let _ = self.status.send_replace(t.to);
            self.publish(ConnectionEvent::StatusChanged {
                key: self.key.clone(),
                from: t.from,
                to: t.to,
            });
        }

        match t.effect {
            Effect::StartSession => {
                info!(key = %self.key, "connected");
                self.publish(ConnectionEvent::Connected {
                    key: self.key.clone(),
                });
            }
            Effect::ScheduleRetry { delay, attempt } => {
                warn!(
                    key = %self.key,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "connection lost, reconnecting"
                );
                counter!("tether_ws_reconnects_total").increment(1);
                self.publish(ConnectionEvent::Reconnecting {
                    key: self.key.clone(),
                    attempt,
                    delay,
                });
            }
            Effect::GiveUp { attempts } => {
                warn!(key = %self.key, attempts, "reconnect attempts exhausted");
                self.publish(ConnectionEvent::Failed {
                    key: self.key.clone(),
                    attempts,
                });
            }
            Effect::Stop if t.to == ConnectionStatus::Disconnected => {
                let (code, reason) = close.unwrap_or((CLOSE_NORMAL, ""));
                info!(key = %self.key, code, reason, "disconnected");
                self.publish(ConnectionEvent::Disconnected {
                    key: self.key.clone(),
                    code,
                    reason: reason.to_owned(),
                });
            }
            Effect::Open | Effect::Stop | Effect::None => {}
        }
        t.effect
    }

    fn dropped(&self, frame: String) {
        warn!(key = %self.key, "outbound queue full, dropping oldest frame");
        counter!("tether_ws_queue_dropped_total").increment(1);
        self.publish(ConnectionEvent::MessageDropped {
            key: self.key.clone(),
            frame,
        });
    }

    pub(crate) fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
