//! The deduplicating request client.
//!
//! One [`RequestClient`] owns a dedup table keyed by
//! [`Request::dedupe_key`]. The first caller for a key spawns the transport
//! call as its own task and stores a shared handle to its outcome; every
//! caller that arrives while that entry exists awaits the same handle, so
//! exactly one call reaches the backend and everyone sees the same result.
//!
//! After the call settles the entry lingers for the configured grace window,
//! then is evicted. Eviction is generation-checked so a stale timer never
//! removes a newer entry for the same key (e.g. after [`RequestClient::dispose`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use tether_core::ClassifiedError;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::availability::{AvailabilityTracker, Transition};
use crate::classify::{
    Classification, Notice, RateLimitWait, RawReply, classify_failure, classify_reply,
};
use crate::config::RequestClientConfig;
use crate::events::ClientEvent;
use crate::metadata::{REQUEST_ID_HEADER, RequestMetadata};
use crate::request::{Request, Response};

/// Buffered client events per subscriber.
const EVENT_CAPACITY: usize = 64;

type SharedOutcome = Shared<BoxFuture<'static, Result<Response, ClassifiedError>>>;

struct PendingEntry {
    generation: u64,
    outcome: SharedOutcome,
}

/// HTTP client with per-key in-flight deduplication and uniform error
/// classification. Cheap to clone; clones share one dedup table.
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    config: RequestClientConfig,
    pending: DashMap<String, PendingEntry>,
    next_generation: AtomicU64,
    availability: AvailabilityTracker,
    events: broadcast::Sender<ClientEvent>,
}

impl RequestClient {
    /// Create a client.
    pub fn new(config: RequestClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                http,
                availability: AvailabilityTracker::new(config.unavailable_threshold),
                config,
                pending: DashMap::new(),
                next_generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &RequestClientConfig {
        &self.inner.config
    }

    /// Issue a request, or join the in-flight call for the same dedupe key.
    pub async fn send(&self, request: Request) -> Result<Response, ClassifiedError> {
        request.validate()?;
        let key = request.dedupe_key();

        let outcome = match self.inner.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                metrics::counter!("tether_http_dedup_hits_total").increment(1);
                debug!(key = %key, "joining in-flight request");
                entry.get().outcome.clone()
            }
            Entry::Vacant(slot) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let outcome = Inner::spawn_call(&self.inner, key, generation, request);
                let _ = slot.insert(PendingEntry {
                    generation,
                    outcome: outcome.clone(),
                });
                outcome
            }
        };

        outcome.await
    }

    /// Forget every dedup entry.
    ///
    /// Calls already handed to the transport keep running and still settle
    /// for the callers awaiting them; later calls start fresh.
    pub fn dispose(&self) {
        let dropped = self.inner.pending.len();
        self.inner.pending.clear();
        debug!(dropped, "request client disposed");
    }

    /// Number of live dedup entries (in flight or within the grace window).
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Whether fallback mode is active.
    pub fn is_degraded(&self) -> bool {
        self.inner.availability.is_degraded()
    }
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.inner.config.base_url)
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn spawn_call(
        inner: &Arc<Self>,
        key: String,
        generation: u64,
        request: Request,
    ) -> SharedOutcome {
        let task = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            let outcome = task.execute(&request).await;
            task.schedule_eviction(key, generation);
            outcome
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(ClassifiedError::network(format!(
                    "request task ended abnormally: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }

    fn schedule_eviction(self: &Arc<Self>, key: String, generation: u64) {
        let inner = Arc::clone(self);
        let grace = self.config.dedup_grace;
        let _ = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = inner
                .pending
                .remove_if(&key, |_, entry| entry.generation == generation);
        });
    }

    /// One logical call: a transport attempt plus at most one rate-limit retry.
    async fn execute(&self, request: &Request) -> Result<Response, ClassifiedError> {
        metrics::counter!("tether_http_requests_total", "method" => request.method().as_str())
            .increment(1);
        let body = request.body_bytes()?;

        let mut retry_allowed = true;
        loop {
            let Classification {
                outcome,
                retry,
                notice,
            } = self.attempt(request, &body, retry_allowed).await;

            if let Some(notice) = notice {
                self.publish(match notice {
                    Notice::BackendUnavailable => ClientEvent::BackendUnavailable {
                        path: request.path().to_owned(),
                    },
                    Notice::RateLimited { retry_after } => ClientEvent::RateLimited {
                        path: request.path().to_owned(),
                        retry_after,
                    },
                });
            }

            if let Some(wait) = retry {
                retry_allowed = false;
                metrics::counter!("tether_http_rate_limit_retries_total").increment(1);
                warn!(
                    path = request.path(),
                    wait_ms = wait.as_millis() as u64,
                    "rate limited, retrying once"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            match self.availability.record(&outcome) {
                Some(Transition::Degraded {
                    consecutive_failures,
                }) => self.publish(ClientEvent::FallbackTriggered {
                    consecutive_failures,
                }),
                Some(Transition::Recovered) => self.publish(ClientEvent::BackendRecovered),
                None => {}
            }
            if let Err(e) = &outcome {
                debug!(path = request.path(), error = %e, "request failed");
            }
            return outcome;
        }
    }

    async fn attempt(&self, request: &Request, body: &[u8], retry_allowed: bool) -> Classification {
        let metadata = RequestMetadata::new(request.method(), body);
        let url = self.url_for(request.path());
        let deadline = request.timeout().unwrap_or(self.config.request_timeout);

        let mut builder = self
            .http
            .request(request.method().into(), &url)
            .timeout(deadline);
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if request.body().is_some() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }
        builder = metadata.apply(builder);

        debug!(
            method = %request.method(),
            url = %url,
            request_id = %metadata.request_id,
            "sending request"
        );

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Self::no_response(&e),
        };
        let status = response.status().as_u16();
        let retry_after = header_string(response.headers(), RETRY_AFTER.as_str());
        let request_id = header_string(response.headers(), REQUEST_ID_HEADER);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Self::no_response(&e),
        };

        classify_reply(
            RawReply {
                status,
                retry_after: retry_after.as_deref(),
                request_id: request_id.as_deref(),
                body: &bytes[..],
            },
            RateLimitWait {
                fallback: self.config.rate_limit_fallback,
                max: deadline,
            },
            retry_allowed,
        )
    }

    fn no_response(e: &reqwest::Error) -> Classification {
        Classification {
            outcome: Err(classify_failure(e.is_timeout(), e.to_string())),
            retry: None,
            notice: None,
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.config.base_url)
        } else {
            format!("{}/{path}", self.config.base_url)
        }
    }

    fn publish(&self, event: ClientEvent) {
        debug!(event = event.name(), "client event");
        let _ = self.events.send(event);
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tether_core::ErrorKind;

    #[tokio::test]
    async fn invalid_request_never_creates_entry() {
        let client = RequestClient::new(RequestClientConfig::with_base_url("http://127.0.0.1:9"));
        let err = client.send(Request::get("")).await.unwrap_err();
        assert_matches!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn url_for_joins_paths() {
        let client = RequestClient::new(RequestClientConfig::with_base_url("http://h:1/"));
        assert_eq!(client.inner.url_for("/health"), "http://h:1/health");
        assert_eq!(client.inner.url_for("health"), "http://h:1/health");
    }
}
