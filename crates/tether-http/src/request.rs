//! Request and response types.
//!
//! A [`Request`] is built once and never mutated after it is handed to
//! [`RequestClient::send`](crate::RequestClient::send). Its dedupe key is
//! either caller-chosen or derived from method, path, query and a SHA-256 of
//! the body, so two structurally identical calls coalesce.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tether_core::ClassifiedError;
use tether_core::encoding::encode_component;

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Methods that change backend state carry a content hash header.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A single backend call.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Option<Duration>,
    dedupe_key: Option<String>,
}

impl Request {
    /// A request with no body, query, timeout or explicit key.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            dedupe_key: None,
        }
    }

    /// `GET path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// `POST path` with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Override the client-wide deadline for this call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Coalesce under an explicit key instead of the derived one.
    #[must_use]
    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Target path, relative to the base address.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters, in insertion order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// JSON body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Per-call deadline, if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Reject requests that must never reach the transport.
    pub fn validate(&self) -> Result<(), ClassifiedError> {
        if self.path.trim().is_empty() {
            return Err(ClassifiedError::invalid_request("request path is empty"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClassifiedError::invalid_request(
                "request timeout must be greater than zero",
            ));
        }
        if self.body.is_some() && !self.method.is_mutating() {
            return Err(ClassifiedError::invalid_request(format!(
                "{} requests cannot carry a body",
                self.method
            )));
        }
        if self.dedupe_key.as_deref().is_some_and(str::is_empty) {
            return Err(ClassifiedError::invalid_request("dedupe key is empty"));
        }
        Ok(())
    }

    /// Serialized body bytes. Empty when there is no body.
    pub(crate) fn body_bytes(&self) -> Result<Vec<u8>, ClassifiedError> {
        match &self.body {
            Some(body) => serde_json::to_vec(body)
                .map_err(|e| ClassifiedError::invalid_request(format!("unencodable body: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// The key concurrent identical calls coalesce under.
    ///
    /// Query names and values are percent-encoded, so a value containing
    /// `&` or `=` never collides with a request carrying more parameters.
    pub fn dedupe_key(&self) -> String {
        if let Some(key) = &self.dedupe_key {
            return key.clone();
        }
        let mut key = format!("{} {}", self.method, self.path);
        for (i, (name, value)) in self.query.iter().enumerate() {
            key.push(if i == 0 { '?' } else { '&' });
            key.push_str(&encode_component(name));
            key.push('=');
            key.push_str(&encode_component(value));
        }
        if let Some(body) = &self.body {
            key.push(' ');
            key.push_str(&sha256_hex(body.to_string().as_bytes()));
        }
        key
    }
}

/// A settled successful call.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// HTTP status (always 2xx).
    pub status: u16,
    /// Decoded JSON body; `Null` for an empty body.
    pub body: Value,
    /// `X-Request-ID` echoed by the backend, if any.
    pub request_id: Option<String>,
}

/// Lower-case hex SHA-256.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tether_core::ErrorKind;

    #[test]
    fn empty_path_rejected() {
        let err = Request::get("  ").validate().unwrap_err();
        assert_matches!(err.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = Request::get("/health")
            .with_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.message.contains("timeout"));
    }

    #[test]
    fn identical_requests_share_key() {
        let a = Request::post("/api/v1/items/a/execute", json!({"x": 1}));
        let b = Request::post("/api/v1/items/a/execute", json!({"x": 1}));
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn body_method_and_query_split_keys() {
        let base = Request::post("/p", json!({"x": 1}));
        assert_ne!(base.dedupe_key(), Request::post("/p", json!({"x": 2})).dedupe_key());
        assert_ne!(
            base.dedupe_key(),
            Request::new(Method::Put, "/p").with_body(json!({"x": 1})).dedupe_key()
        );
        assert_ne!(
            Request::get("/items").dedupe_key(),
            Request::get("/items").with_query("category", "a").dedupe_key()
        );
    }

    #[test]
    fn get_with_body_rejected() {
        let err = Request::get("/health").with_body(json!({})).validate().unwrap_err();
        assert_matches!(err.kind, ErrorKind::InvalidRequest);
        assert!(err.message.contains("GET"));
        assert!(Request::post("/p", json!({})).validate().is_ok());
    }

    #[test]
    fn separators_inside_query_values_do_not_collide() {
        let packed = Request::get("/api/v1/items").with_query("category", "x&y=z");
        let split = Request::get("/api/v1/items")
            .with_query("category", "x")
            .with_query("y", "z");
        assert_ne!(packed.dedupe_key(), split.dedupe_key());
        assert_eq!(packed.dedupe_key(), "GET /api/v1/items?category=x%26y%3Dz");
        assert_eq!(split.dedupe_key(), "GET /api/v1/items?category=x&y=z");
    }

    #[test]
    fn explicit_key_wins() {
        let req = Request::get("/health").with_dedupe_key("probe");
        assert_eq!(req.dedupe_key(), "probe");
    }

    #[test]
    fn derived_key_shape() {
        let req = Request::get("/api/v1/items").with_query("category", "slides");
        assert_eq!(req.dedupe_key(), "GET /api/v1/items?category=slides");
    }

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn only_get_is_non_mutating() {
        assert!(!Method::Get.is_mutating());
        assert!(Method::Post.is_mutating());
        assert!(Method::Delete.is_mutating());
    }
}
