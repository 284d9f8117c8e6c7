#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! New Relic Insights exporter for [`vernier`].
//!
//! Every step, each meter of a [`vernier::MeterRegistry`] becomes one Insights event. The
//! events of a batch are posted as one JSON array to
//! `{uri}/v1/accounts/{account_id}/events` with the `X-Insert-Key` header. At most
//! [`MAX_EVENTS_PER_REQUEST`] events go into one request.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vernier::{MeterRegistry, Sender, Tags};
//! use vernier_newrelic::{NewRelicBackend, NewRelicConfig};
//! # async fn example(http: Arc<dyn Sender>) -> vernier::Result<()> {
//!
//! let config = NewRelicConfig {
//!     account_id: "12345".to_string(),
//!     api_key: "NRII-secret".to_string(),
//!     ..NewRelicConfig::default()
//! };
//!
//! let registry = MeterRegistry::new();
//! let handle = NewRelicBackend::publisher(registry.clone(), &config, http)?.start();
//!
//! registry.counter("orders.placed", Tags::empty()).increment();
//!
//! handle.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! This crate does not make HTTP requests itself. The application supplies a
//! [`vernier::Sender`] that posts each payload to [`vernier::Payload::uri()`] with the
//! payload's headers.

mod backend;
mod config;
mod event;
mod naming;

pub use backend::*;
pub use config::*;
pub use naming::*;
