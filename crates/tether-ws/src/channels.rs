//! Channel addressing.
//!
//! One socket per logical channel: `/ws/server` for backend-wide events and
//! `/ws/items/{name}` for a single item.

use std::fmt;

use tether_core::ConnectionError;
use tether_core::encoding::encode_segment;

/// A logical event channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Backend-wide events.
    Server,
    /// Events for one item.
    Item(String),
}

impl Channel {
    /// URL path of the channel.
    pub fn path(&self) -> String {
        match self {
            Self::Server => "/ws/server".to_owned(),
            Self::Item(name) => format!("/ws/items/{}", encode_segment(name)),
        }
    }

    /// Connection key conventionally used for this channel.
    pub fn key(&self) -> String {
        match self {
            Self::Server => "server".to_owned(),
            Self::Item(name) => format!("items/{name}"),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// WebSocket URL for `channel` on the backend at `base` (`http`→`ws`,
/// `https`→`wss`; `ws`/`wss` pass through).
pub fn channel_url(base: &str, channel: &Channel) -> Result<String, ConnectionError> {
    let base = base.trim().trim_end_matches('/');
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ConnectionError::InvalidUrl(base.to_owned()))?;
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ConnectionError::InvalidUrl(base.to_owned())),
    };
    if rest.is_empty() {
        return Err(ConnectionError::InvalidUrl(base.to_owned()));
    }
    Ok(format!("{scheme}://{rest}{}", channel.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn http_becomes_ws() {
        assert_eq!(
            channel_url("http://127.0.0.1:8765/", &Channel::Server).unwrap(),
            "ws://127.0.0.1:8765/ws/server"
        );
    }

    #[test]
    fn https_becomes_wss_and_names_are_encoded() {
        assert_eq!(
            channel_url("https://host", &Channel::Item("my deck".into())).unwrap(),
            "wss://host/ws/items/my%20deck"
        );
    }

    #[test]
    fn rejects_other_schemes() {
        assert_matches!(
            channel_url("ftp://host", &Channel::Server),
            Err(ConnectionError::InvalidUrl(_))
        );
        assert_matches!(
            channel_url("localhost:8765", &Channel::Server),
            Err(ConnectionError::InvalidUrl(_))
        );
    }

    #[test]
    fn keys() {
        assert_eq!(Channel::Server.key(), "server");
        assert_eq!(Channel::Item("intro".into()).key(), "items/intro");
    }
}
