//! Shared configuration, error types, IDs, and observability primitives for RFQ crates.
//!
//! Architecture role:
//! - defines per-query configuration passed across layers
//! - provides common [`RfqError`] / [`Result`] contracts
//! - hosts the metrics registry used by the merge engine and the fan-in source
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::QueryConfig;
pub use error::{Result, RfqError};
pub use ids::{NodeId, QueryId};
pub use metrics::{MetricsRegistry, global_metrics};
