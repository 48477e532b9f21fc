//! Keyed connection table.
//!
//! [`ConnectionManager`] owns a table of independent connections addressed
//! by caller-chosen keys. Each active connection has its own driver task;
//! the table lock is only ever taken before a connection's own lock, never
//! the other way round, and drivers never take it at all.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::{ConnectionError, Envelope};
use tether_settings::ConnectionSettings;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::driver;
use crate::events::ConnectionEvent;
use crate::state::ConnectionStatus;
use crate::transport::{Connector, TungsteniteConnector};

const EVENT_CAPACITY: usize = 256;

struct Shared {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    table: Mutex<HashMap<String, Arc<Connection>>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        for conn in self.table.get_mut().values() {
            conn.cancel_token().cancel();
        }
    }
}

/// Manages zero or more named persistent connections.
///
/// Cheap to clone; clones share the same table. Dropping the last clone
/// (and every [`ConnectionHandle`]) stops all drivers without close frames;
/// call [`close_all`](Self::close_all) for a clean shutdown.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.shared.config)
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Manager using real WebSocket connections.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Manager configured from loaded settings.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self::new(ConnectionConfig::from(settings))
    }

    /// Manager using a custom transport.
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                table: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Connect `key` to `url`.
    ///
    /// Idempotent: if `key` is already connecting, connected, or waiting to
    /// reconnect, the existing connection is kept and no second socket is
    /// opened. From `Disconnected` or `Failed` a fresh cycle starts with the
    /// attempt counter at zero. Anything queued under `key` beforehand is
    /// flushed first once the socket opens.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, key: &str, url: &str) -> ConnectionHandle {
        let conn = self.entry(key);
        if conn.connect(url) {
            debug!(key, url, "spawning connection driver");
            let _ = tokio::spawn(driver::run(
                Arc::clone(&conn),
                Arc::clone(&self.shared.connector),
                self.shared.config.clone(),
            ));
        }
        self.handle(key)
    }

    /// Send `envelope` on `key`: immediately if connected, otherwise via the
    /// bounded outbound queue. Sending to a key that was never connected
    /// registers it as `Disconnected` so the message goes out on the first
    /// successful [`connect`](Self::connect).
    pub fn send(&self, key: &str, envelope: &Envelope) -> Result<(), ConnectionError> {
        let frame = envelope
            .to_json()
            .map_err(|e| ConnectionError::Encode(e.to_string()))?;
        self.entry(key).enqueue(frame);
        Ok(())
    }

    /// Cleanly close `key` (code 1000) and forget it: timers, queue, and
    /// status are released and no reconnect follows. Returns whether the key
    /// was known.
    pub fn close(&self, key: &str) -> bool {
        let removed = self.shared.table.lock().remove(key);
        match removed {
            Some(conn) => {
                info!(key, "closing connection");
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Close every known connection.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.shared.table.lock().drain().collect();
        for (key, conn) in drained {
            info!(key = %key, "closing connection");
            conn.close();
        }
    }

    /// Current status of `key`, if registered.
    pub fn status(&self, key: &str) -> Option<ConnectionStatus> {
        self.lookup(key).map(|c| c.status())
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.shared.table.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Frames waiting in the outbound queue of `key`.
    pub fn queued(&self, key: &str) -> usize {
        self.lookup(key).map_or(0, |c| c.queued())
    }

    /// Subscribe to events from every connection of this manager.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Handle for `key`, whether or not it is registered.
    pub fn handle(&self, key: &str) -> ConnectionHandle {
        ConnectionHandle {
            key: key.to_owned(),
            manager: self.clone(),
        }
    }

    fn entry(&self, key: &str) -> Arc<Connection> {
        let mut table = self.shared.table.lock();
        let conn = table.entry(key.to_owned()).or_insert_with(|| {
            Arc::new(Connection::new(
                key.to_owned(),
                self.shared.config.backoff.clone(),
                self.shared.config.queue_capacity,
                self.shared.events.clone(),
            ))
        });
        Arc::clone(conn)
    }

    fn lookup(&self, key: &str) -> Option<Arc<Connection>> {
        self.shared.table.lock().get(key).cloned()
    }
}

/// A view of one keyed connection.
///
/// Every call goes through the manager table, so a handle never disagrees
/// with the manager about status, and a handle to a closed key reports it
/// as unknown.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    key: String,
    manager: ConnectionManager,
}

impl ConnectionHandle {
    /// The connection key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current status, or `None` once the key has been closed.
    pub fn status(&self) -> Option<ConnectionStatus> {
        self.manager.status(&self.key)
    }

    /// Wait until the connection reaches `status`.
    ///
    /// Fails with [`ConnectionError::UnknownKey`] if the key is not
    /// registered or is closed while waiting.
    pub async fn wait_for(&self, status: ConnectionStatus) -> Result<(), ConnectionError> {
        let unknown = || ConnectionError::UnknownKey(self.key.clone());
        let mut rx = self
            .manager
            .lookup(&self.key)
            .map(|c| c.watch_status())
            .ok_or_else(unknown)?;
        let _ = rx.wait_for(|s| *s == status).await.map_err(|_| unknown())?;
        Ok(())
    }

    /// Send on this connection; see [`ConnectionManager::send`].
    pub fn send(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        self.manager.send(&self.key, envelope)
    }

    /// Close this connection; see [`ConnectionManager::close`].
    pub fn close(&self) -> bool {
        self.manager.close(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_before_connect_registers_and_queues() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        manager.send("server", &Envelope::ping()).unwrap();
        assert_eq!(manager.status("server"), Some(ConnectionStatus::Disconnected));
        assert_eq!(manager.queued("server"), 1);
        assert_eq!(manager.keys(), vec!["server"]);
    }

    #[test]
    fn close_forgets_key() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        manager.send("a", &Envelope::ping()).unwrap();
        let handle = manager.handle("a");
        assert!(handle.close());
        assert!(!manager.close("a"));
        assert_eq!(handle.status(), None);
        assert_eq!(manager.queued("a"), 0);
    }

    #[test]
    fn close_all_empties_table() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        manager.send("a", &Envelope::ping()).unwrap();
        manager.send("b", &Envelope::ping()).unwrap();
        manager.close_all();
        assert!(manager.keys().is_empty());
    }

    #[tokio::test]
    async fn wait_for_unknown_key_fails() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let err = manager
            .handle("nope")
            .wait_for(ConnectionStatus::Connected)
            .await
            .unwrap_err();
        assert_eq!(err, ConnectionError::UnknownKey("nope".into()));
    }
}
