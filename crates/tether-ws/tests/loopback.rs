//! End-to-end over a real WebSocket server on the loopback interface.

use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tether_core::{BackoffPolicy, Envelope};
use tether_ws::{Channel, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionStatus, channel_url};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

async fn next_event(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    mut pred: impl FnMut(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not observed")
}

/// Accepts one client, greets it with an `item-updated`, reports every text
/// frame it receives, and closes normally after a frame of type `bye`.
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let greeting = json!({
            "type": "item-updated",
            "payload": {"name": "deck", "status": "ready"},
            "id": "g1",
            "timestamp": "2026-01-01T00:00:00Z"
        });
        ws.send(WsMessage::Text(greeting.to_string().into())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let WsMessage::Text(text) = message {
                let text = text.as_str().to_owned();
                let bye = Envelope::parse(&text).is_ok_and(|e| e.message_type == "bye");
                let _ = seen_tx.send(text);
                if bye {
                    let _ = ws
                        .close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "done".into(),
                        }))
                        .await;
                }
            }
        }
    });

    (base, seen_rx)
}

#[tokio::test]
async fn round_trip_over_real_socket() {
    let (base, mut seen) = spawn_server().await;
    let url = channel_url(&base, &Channel::Server).unwrap();
    assert!(url.starts_with("ws://127.0.0.1:"));
    assert!(url.ends_with("/ws/server"));

    let manager = ConnectionManager::new(ConnectionConfig {
        heartbeat_interval: None,
        ..ConnectionConfig::default()
    });
    let mut events = manager.subscribe();

    manager
        .send("server", &Envelope::new("hello", json!({"client": "test"})))
        .unwrap();
    let handle = manager.connect("server", &url);
    timeout(Duration::from_secs(5), handle.wait_for(ConnectionStatus::Connected))
        .await
        .unwrap()
        .unwrap();

    assert_matches!(
        next_event(&mut events, |e| matches!(e, ConnectionEvent::ItemUpdated { .. })).await,
        ConnectionEvent::ItemUpdated { key, payload } if key == "server" && payload.name == "deck"
    );

    let first = timeout(Duration::from_secs(5), seen.recv()).await.unwrap().unwrap();
    assert_eq!(Envelope::parse(&first).unwrap().message_type, "hello");

    handle.send(&Envelope::new("bye", json!({}))).unwrap();
    let second = timeout(Duration::from_secs(5), seen.recv()).await.unwrap().unwrap();
    assert_eq!(Envelope::parse(&second).unwrap().message_type, "bye");

    assert_matches!(
        next_event(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await,
        ConnectionEvent::Disconnected { code: 1000, reason, .. } if reason == "done"
    );
    assert_eq!(handle.status(), Some(ConnectionStatus::Disconnected));
}

#[tokio::test]
async fn refused_socket_reconnects_then_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ConnectionManager::new(ConnectionConfig {
        backoff: BackoffPolicy {
            base_delay_ms: 10,
            multiplier: 2.0,
            max_delay_ms: 50,
            max_attempts: 2,
        },
        heartbeat_interval: None,
        ..ConnectionConfig::default()
    });
    let mut events = manager.subscribe();
    let handle = manager.connect("server", &format!("ws://{addr}/ws/server"));

    assert_matches!(
        next_event(&mut events, |e| matches!(e, ConnectionEvent::Failed { .. })).await,
        ConnectionEvent::Failed { attempts: 2, .. }
    );
    assert_eq!(handle.status(), Some(ConnectionStatus::Failed));
}
