//! Observability subsystem.
//!
//! # Responsibilities
//! - Tracing/logging initialization
//! - Metric naming and the sealed description registry
//!
//! Exposition (the Prometheus endpoint) is external glue; the core
//! only emits through the `metrics` facade and keeps working when no
//! recorder is installed.

pub mod logging;
pub mod metrics;

pub use metrics::{default_registry, MetricKind, MetricSpec, Registry};
