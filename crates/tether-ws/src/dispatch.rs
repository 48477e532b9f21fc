//! Inbound frame routing.
//!
//! Turns one text frame into what the driver should do with it: reply on the
//! socket (ping), drop it (pong), or publish events. Nothing here can close
//! the connection.

use tether_core::messages::{Decoded, MessageBody, decode};
use tether_core::Envelope;
use tracing::warn;

use crate::events::ConnectionEvent;

/// What to do with an inbound frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Write this frame back on the same socket.
    Reply(String),
    /// Publish these events, in order.
    Publish(Vec<ConnectionEvent>),
    /// Consume silently.
    Ignore,
}

/// Route one text frame received on connection `key`.
pub(crate) fn route(key: &str, text: &str) -> Inbound {
    let message = match decode(text) {
        Ok(Decoded::Known(message)) => message,
        Ok(Decoded::Unknown(envelope)) => {
            warn!(key, message_type = %envelope.message_type, "unknown message type");
            return Inbound::Publish(vec![ConnectionEvent::UnknownMessage {
                key: key.to_owned(),
                envelope,
            }]);
        }
        Err(error) => {
            warn!(key, error = %error, "undecodable frame");
            return Inbound::Publish(vec![ConnectionEvent::ProtocolError {
                key: key.to_owned(),
                error,
            }]);
        }
    };

    let key = key.to_owned();
    let typed = match &message.body {
        MessageBody::Ping => {
            return match Envelope::pong().to_json() {
                Ok(pong) => Inbound::Reply(pong),
                Err(_) => Inbound::Ignore,
            };
        }
        MessageBody::Pong => return Inbound::Ignore,
        MessageBody::ItemUpdated(p) => ConnectionEvent::ItemUpdated {
            key: key.clone(),
            payload: p.clone(),
        },
        MessageBody::ExecutionStarted(p) => ConnectionEvent::ExecutionStarted {
            key: key.clone(),
            payload: p.clone(),
        },
        MessageBody::ExecutionCompleted(p) => ConnectionEvent::ExecutionCompleted {
            key: key.clone(),
            payload: p.clone(),
        },
        MessageBody::ExecutionFailed(p) => ConnectionEvent::ExecutionFailed {
            key: key.clone(),
            payload: p.clone(),
        },
        MessageBody::ServerStatusChanged(p) => ConnectionEvent::ServerStatusChanged {
            key: key.clone(),
            payload: p.clone(),
        },
        MessageBody::FileChanged(p) => ConnectionEvent::FileChanged {
            key: key.clone(),
            payload: p.clone(),
        },
        MessageBody::Error(p) => ConnectionEvent::ServerError {
            key: key.clone(),
            payload: p.clone(),
        },
    };

    Inbound::Publish(vec![ConnectionEvent::Message { key, message }, typed])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tether_core::DecodeError;

    #[test]
    fn ping_gets_pong_reply() {
        let reply = route("server", r#"{"type":"ping","payload":{}}"#);
        let Inbound::Reply(text) = reply else {
            panic!("expected reply, got {reply:?}");
        };
        let envelope = Envelope::parse(&text).unwrap();
        assert_eq!(envelope.message_type, "pong");
    }

    #[test]
    fn pong_is_consumed() {
        assert_eq!(route("server", r#"{"type":"pong","payload":{}}"#), Inbound::Ignore);
    }

    #[test]
    fn known_message_publishes_generic_then_typed() {
        let frame = r#"{"type":"execution-failed","payload":{"name":"deck","error":"boom"},"id":"e","timestamp":1}"#;
        let Inbound::Publish(events) = route("items/deck", frame) else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 2);
        assert_matches!(&events[0], ConnectionEvent::Message { key, .. } if key == "items/deck");
        assert_matches!(
            &events[1],
            ConnectionEvent::ExecutionFailed { payload, .. } if payload.error == "boom"
        );
    }

    #[test]
    fn backend_error_maps_to_server_error() {
        let frame = r#"{"type":"error","payload":{"message":"render failed","code":"E_RENDER"}}"#;
        let Inbound::Publish(events) = route("server", frame) else {
            panic!("expected events");
        };
        assert_matches!(
            &events[1],
            ConnectionEvent::ServerError { payload, .. } if payload.code.as_deref() == Some("E_RENDER")
        );
    }

    #[test]
    fn unknown_type_is_a_warning_event() {
        let Inbound::Publish(events) = route("server", r#"{"type":"telemetry","payload":{}}"#) else {
            panic!("expected events");
        };
        assert_matches!(
            events.as_slice(),
            [ConnectionEvent::UnknownMessage { envelope, .. }] if envelope.message_type == "telemetry"
        );
    }

    #[test]
    fn garbage_is_a_protocol_error_event() {
        let Inbound::Publish(events) = route("server", "{not json") else {
            panic!("expected events");
        };
        assert_matches!(
            events.as_slice(),
            [ConnectionEvent::ProtocolError { error: DecodeError::InvalidEnvelope(_), .. }]
        );
    }
}
