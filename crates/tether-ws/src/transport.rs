//! Transport seam.
//!
//! The driver speaks [`Frame`]s over a boxed sink/stream pair produced by a
//! [`Connector`]. [`TungsteniteConnector`] is the real WebSocket client;
//! tests plug in an in-memory connector.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tether_core::ConnectionError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Close code for a normal, intentional close.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer vanished without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// A protocol-level frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying one serialized envelope.
    Text(String),
    /// A close frame.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ConnectionError> + Send>>;
/// Inbound half of an open connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, ConnectionError>> + Send>>;

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`. Resolving is the `open` event.
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), ConnectionError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
///
/// Protocol-level ping/pong frames are answered by tungstenite itself and
/// never surface as [`Frame`]s; binary frames are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), ConnectionError> {
        let (ws, _response) =
            connect_async(url)
                .await
                .map_err(|e| ConnectionError::ConnectFailed {
                    url: url.to_owned(),
                    reason: e.to_string(),
                })?;
        let (ws_tx, ws_rx) = ws.split();

        let sink = ws_tx
            .sink_map_err(|e| ConnectionError::Transport(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, ConnectionError>(to_ws(frame))));

        let stream = ws_rx.filter_map(|item| {
            future::ready(match item {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(WsMessage::Close(frame)) => Some(Ok(from_close(frame))),
                Ok(_) => None,
                Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn to_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text.into()),
        Frame::Close { code, reason } => WsMessage::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

fn from_close(frame: Option<CloseFrame>) -> Frame {
    match frame {
        Some(frame) => Frame::Close {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        },
        None => Frame::Close {
            code: CLOSE_NO_STATUS,
            reason: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let ws = to_ws(Frame::Close {
            code: CLOSE_NORMAL,
            reason: "bye".into(),
        });
        let WsMessage::Close(frame) = ws else {
            panic!("expected close");
        };
        assert_eq!(
            from_close(frame),
            Frame::Close {
                code: 1000,
                reason: "bye".into()
            }
        );
    }

    #[test]
    fn bare_close_reports_no_status() {
        assert_eq!(
            from_close(None),
            Frame::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new()
            }
        );
    }

    #[tokio::test]
    async fn refused_connect_is_connect_failed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("ws://{addr}/ws/server");
        let Err(err) = TungsteniteConnector.connect(&url).await else {
            panic!("connect should fail");
        };
        assert!(matches!(err, ConnectionError::ConnectFailed { url: u, .. } if u == url));
    }
}
