#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! # vernier
//!
//! A vendor-neutral instrumentation facade: application code records measurements into
//! meters held by a [`MeterRegistry`], and exporters periodically publish what was recorded
//! to a monitoring backend in that backend's wire format.
//!
//! # Meters
//!
//! Every meter is identified by a name, a set of tags and its kind. Registering the same
//! identity twice returns the same meter, so handles can be obtained wherever they are needed
//! without coordination:
//!
//! ```
//! use std::time::Duration;
//!
//! use vernier::{MeterRegistry, Tags};
//!
//! let registry = MeterRegistry::new();
//!
//! let requests = registry.counter("http.requests", Tags::of([("method", "GET")]));
//! requests.increment();
//!
//! let latency = registry.timer("http.latency", Tags::of([("method", "GET")]));
//! latency.record(Duration::from_millis(42));
//!
//! // Same identity, same meter.
//! registry
//!     .counter("http.requests", Tags::of([("method", "GET")]))
//!     .increment();
//! assert_eq!(requests.count(), 2.0);
//! ```
//!
//! The available kinds are [`Counter`], [`Gauge`], [`Timer`], [`DistributionSummary`],
//! [`LongTaskTimer`], [`FunctionCounter`], [`FunctionTimer`] and [`CustomMeter`]. Each has a
//! builder for the less common settings, such as histogram buckets or a base unit:
//!
//! ```
//! use vernier::{DistributionSummary, MeterRegistry, base_units};
//!
//! let registry = MeterRegistry::new();
//!
//! let payload_size = DistributionSummary::builder("http.payload.size")
//!     .tag("direction", "inbound")
//!     .base_unit(base_units::BYTES)
//!     .buckets(&[1024.0, 16384.0, 65536.0])
//!     .register(&registry);
//!
//! payload_size.record(2048.0);
//! ```
//!
//! Gauges and function-based meters read their value from the application when the meter is
//! observed. Function-based meters only hold a weak reference to the observed object and
//! report nothing once it has been dropped.
//!
//! # Filters and naming
//!
//! Filters added through [`MeterRegistry::config()`] can rename meters, add or drop tags and
//! deny registrations outright. A denied registration returns a working handle that records
//! nothing, so instrumented code never needs to check.
//!
//! How names and tag keys appear in the exported data is decided by a
//! [`NamingConvention`]. Each exporter renders with the convention its backend prefers,
//! unless one has been set on the registry explicitly.
//!
//! # Publishing
//!
//! A [`StepPublisher`] exports the registry once per step. Step-scoped statistics such as
//! counts and maximums reset after every publish, so each publish reports what happened
//! during the last step. The wire format comes from a [`Backend`], the transport from a
//! [`Sender`] supplied by the application.
//!
//! # Panic policy
//!
//! Recording measurements never panics and never returns errors. Invalid amounts, such as
//! negative counter increments or non-finite values, are ignored.

mod atomics;
mod clock;
mod constants;
mod error;
pub mod filter;
mod id;
mod meter;
mod meters;
pub mod naming;
mod naming_cache;
mod publish;
mod registry;
mod search;
mod statistic;

pub use clock::*;
pub use error::*;
pub use id::*;
pub use meter::*;
pub use meters::*;
pub use naming::NamingConvention;
pub use naming_cache::*;
pub use publish::*;
pub use registry::*;
pub use search::*;
pub use statistic::*;
