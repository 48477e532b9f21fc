//! Tracing headers attached to every outgoing request.
//!
//! Purely observational: the backend may log or dedup on them, the client
//! never reads them back for its own coalescing.

use chrono::Utc;
use tether_core::RequestId;

use crate::request::{Method, sha256_hex};

/// Request id header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Issue time header (epoch milliseconds).
pub const REQUEST_TIMESTAMP_HEADER: &str = "x-request-timestamp";
/// SHA-256 of the body, mutating methods only.
pub const CONTENT_HASH_HEADER: &str = "x-content-hash";

/// Header values for one transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Fresh per transport call (a rate-limit retry gets a new one).
    pub request_id: RequestId,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    /// Present for mutating methods.
    pub content_hash: Option<String>,
}

impl RequestMetadata {
    /// Metadata for a call with the given method and serialized body.
    pub fn new(method: Method, body: &[u8]) -> Self {
        Self {
            request_id: RequestId::new(),
            timestamp_ms: Utc::now().timestamp_millis(),
            content_hash: method.is_mutating().then(|| sha256_hex(body)),
        }
    }

    /// Header name/value pairs.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (REQUEST_ID_HEADER, self.request_id.to_string()),
            (REQUEST_TIMESTAMP_HEADER, self.timestamp_ms.to_string()),
        ];
        if let Some(hash) = &self.content_hash {
            headers.push((CONTENT_HASH_HEADER, hash.clone()));
        }
        headers
    }

    pub(crate) fn apply(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in self.headers() {
            builder = builder.header(name, value);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_has_no_content_hash() {
        let meta = RequestMetadata::new(Method::Get, b"");
        assert!(meta.content_hash.is_none());
        assert_eq!(meta.headers().len(), 2);
    }

    #[test]
    fn post_hashes_body() {
        let meta = RequestMetadata::new(Method::Post, br#"{"a":1}"#);
        let hash = meta.content_hash.clone().unwrap();
        assert_eq!(hash.len(), 64);
        assert!(
            meta.headers()
                .iter()
                .any(|(name, value)| *name == CONTENT_HASH_HEADER && *value == hash)
        );
    }

    #[test]
    fn each_call_gets_fresh_id() {
        let a = RequestMetadata::new(Method::Get, b"");
        let b = RequestMetadata::new(Method::Get, b"");
        assert_ne!(a.request_id, b.request_id);
    }
}
