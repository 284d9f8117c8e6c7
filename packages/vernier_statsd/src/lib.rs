#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! StatsD exporter for [`vernier`].
//!
//! Renders the meters of a [`vernier::MeterRegistry`] as StatsD lines once per step and packs
//! them into payloads no longer than the configured packet length. Three [`Flavor`]s of the
//! line protocol are supported, differing in how tags are attached:
//!
//! ```
//! use vernier_statsd::{Flavor, StatsdConfig};
//!
//! let config = StatsdConfig {
//!     flavor: Flavor::Telegraf,
//!     host: "statsd.internal".to_string(),
//!     ..StatsdConfig::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.address(), "udp://statsd.internal:8125");
//! ```
//!
//! This crate does not open sockets. The application supplies a [`vernier::Sender`] that
//! writes each payload body to the agent at [`vernier::Payload::uri()`], which has the
//! form `protocol://host:port`. Lines within a body are separated by `\n`.
//!
//! Time-based statistics are reported in milliseconds.

mod backend;
mod config;
mod error;
mod flavor;
mod line_builder;

pub use backend::*;
pub use config::*;
pub use error::*;
pub use flavor::*;
