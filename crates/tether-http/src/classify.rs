//! Response classification.
//!
//! A pure step from "what came back" to "what the caller sees". The
//! rate-limit retry and the unavailability notice are returned as data in
//! [`Classification`] rather than performed here, so the client loop owns all
//! waiting and event emission.

use std::time::Duration;

use serde_json::Value;
use tether_core::ClassifiedError;
use tether_core::retry::parse_retry_after_header;

use crate::request::Response;

/// What the transport returned for one call.
#[derive(Clone, Copy, Debug)]
pub struct RawReply<'a> {
    /// HTTP status.
    pub status: u16,
    /// `Retry-After` header value, if present.
    pub retry_after: Option<&'a str>,
    /// `X-Request-ID` header value, if present.
    pub request_id: Option<&'a str>,
    /// Raw body bytes.
    pub body: &'a [u8],
}

/// Side signal produced alongside an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The backend answered 503.
    BackendUnavailable,
    /// The backend answered 429.
    RateLimited {
        /// Wait the backend asked for (header or fallback).
        retry_after: Duration,
    },
}

/// Result of classifying one reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    /// What the caller sees if no retry happens.
    pub outcome: Result<Response, ClassifiedError>,
    /// `Some(delay)` when the call should be repeated once after `delay`.
    pub retry: Option<Duration>,
    /// Signal for subscribers.
    pub notice: Option<Notice>,
}

/// How a 429 is waited out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitWait {
    /// Wait used when the reply carries no usable `Retry-After`.
    pub fallback: Duration,
    /// Longest wait the client will sit through. A longer advertised wait
    /// surfaces the 429 at once instead of retrying.
    pub max: Duration,
}

/// Classify a reply.
///
/// `retry_allowed` is false once the single rate-limit retry has been spent,
/// so a second 429 surfaces as [`ErrorKind::RateLimited`](tether_core::ErrorKind::RateLimited).
pub fn classify_reply(
    reply: RawReply<'_>,
    wait: RateLimitWait,
    retry_allowed: bool,
) -> Classification {
    if (200..300).contains(&reply.status) {
        return Classification {
            outcome: decode_success(reply),
            retry: None,
            notice: None,
        };
    }

    let body: Option<Value> = serde_json::from_slice(reply.body).ok();
    let message = body
        .as_ref()
        .and_then(error_message)
        .or_else(|| reason_phrase(reply.status).map(str::to_owned))
        .unwrap_or_else(|| format!("HTTP {}", reply.status));

    let with_details = |err: ClassifiedError| match &body {
        Some(b) => err.with_details(b.clone()),
        None => err,
    };

    match reply.status {
        429 => {
            let advertised = reply
                .retry_after
                .and_then(parse_retry_after_header)
                .map(Duration::from_millis);
            let delay = advertised.unwrap_or(wait.fallback);
            Classification {
                outcome: Err(with_details(ClassifiedError::rate_limited(advertised, message))),
                retry: (retry_allowed && delay <= wait.max).then_some(delay),
                notice: Some(Notice::RateLimited { retry_after: delay }),
            }
        }
        503 => Classification {
            outcome: Err(with_details(ClassifiedError::http_status(503, message))),
            retry: None,
            notice: Some(Notice::BackendUnavailable),
        },
        code => Classification {
            outcome: Err(with_details(ClassifiedError::http_status(code, message))),
            retry: None,
            notice: None,
        },
    }
}

/// Classify a call that produced no response.
pub fn classify_failure(timed_out: bool, message: impl Into<String>) -> ClassifiedError {
    if timed_out {
        ClassifiedError::timeout(message)
    } else {
        ClassifiedError::network(message)
    }
}

fn decode_success(reply: RawReply<'_>) -> Result<Response, ClassifiedError> {
    let body = if reply.body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(reply.body).map_err(|e| {
            ClassifiedError::malformed(format!("response body is not valid JSON: {e}")).with_details(
                Value::String(String::from_utf8_lossy(reply.body).into_owned()),
            )
        })?
    };
    Ok(Response {
        status: reply.status,
        body,
        request_id: reply.request_id.map(str::to_owned),
    })
}

/// Pull a human message out of a structured error body.
///
/// Accepts `{"message": ".."}`, `{"error": ".."}`, `{"detail": ".."}` and
/// `{"error": {"message": ".."}}`.
fn error_message(body: &Value) -> Option<String> {
    let map = body.as_object()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| match map.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(inner) => inner.get("message")?.as_str().map(str::to_owned),
            _ => None,
        })
}

fn reason_phrase(status: u16) -> Option<&'static str> {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
}
