//! # tether-http
//!
//! Request client for the tether backend.
//!
//! - [`RequestClient`]: at-most-one-in-flight-per-key deduplication, uniform
//!   [`ClassifiedError`](tether_core::ClassifiedError) classification, one
//!   automatic rate-limit retry, fallback-mode tracking
//! - [`BackendApi`]: typed wrappers for every backend endpoint
//! - [`ClientEvent`]: notifications for the embedding application

#![deny(unsafe_code)]

pub mod api;
pub mod availability;
pub mod classify;
pub mod client;
pub mod config;
pub mod events;
pub mod metadata;
pub mod request;

pub use api::{
    BackendApi, BatchExecuteRequest, ExecuteOptions, ExportFormat, ExportRequest, HealthStatus,
    ItemSummary,
};
pub use client::RequestClient;
pub use config::RequestClientConfig;
pub use events::ClientEvent;
pub use request::{Method, Request, Response};
