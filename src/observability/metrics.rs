//! Metric definitions and the sealed metric registry.
//!
//! # Responsibilities
//! - Name every metric the control plane emits
//! - Collect metric descriptions in an explicit registry object
//! - Describe the registered metrics to the installed recorder
//!
//! # Metrics
//! - `controlplane_store_writes_total` (counter): store upserts, by store
//! - `controlplane_store_deletes_total` (counter): store deletes, by store
//! - `controlplane_store_deliveries_total` (counter): subscriber deliveries, by store
//! - `controlplane_snapshot_generations_total` (counter): successful generations
//! - `controlplane_snapshot_version` (gauge): last allocated version
//! - `controlplane_streams_pruned_total` (counter): streams removed by pruning
//! - `controlplane_active_streams` (gauge): currently tracked streams
//!
//! # Design Decisions
//! - The registry is an explicit object handed around at construction
//!   time, not a process-global; it seals on first read and rejects
//!   late registration instead of racing it
//! - Emission is a side channel: a missing recorder never changes
//!   core behavior (the metrics crate no-ops without one)

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Metric name constants, shared by emitters and the registry.
pub mod names {
    pub const STORE_WRITES: &str = "controlplane_store_writes_total";
    pub const STORE_DELETES: &str = "controlplane_store_deletes_total";
    pub const STORE_DELIVERIES: &str = "controlplane_store_deliveries_total";
    pub const SNAPSHOT_GENERATIONS: &str = "controlplane_snapshot_generations_total";
    pub const SNAPSHOT_VERSION: &str = "controlplane_snapshot_version";
    pub const STREAMS_PRUNED: &str = "controlplane_streams_pruned_total";
    pub const ACTIVE_STREAMS: &str = "controlplane_active_streams";
}

/// What kind of instrument a metric is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One registered metric description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub kind: MetricKind,
    pub help: &'static str,
}

/// Registration after the registry sealed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("metric registry is sealed; cannot register {0:?}")]
pub struct SealedError(pub &'static str);

struct RegistryInner {
    specs: Vec<MetricSpec>,
    sealed: bool,
}

/// Explicit registry of metric descriptions.
///
/// Sealed after the first read: once anything has consumed the
/// description set, later registrations are rejected rather than
/// silently missing from the output.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                specs: Vec::new(),
                sealed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register one metric description.
    pub fn register(&self, spec: MetricSpec) -> Result<(), SealedError> {
        let mut inner = self.lock();
        if inner.sealed {
            return Err(SealedError(spec.name));
        }
        inner.specs.push(spec);
        Ok(())
    }

    /// Read the registered descriptions, sealing the registry.
    pub fn specs(&self) -> Vec<MetricSpec> {
        let mut inner = self.lock();
        inner.sealed = true;
        inner.specs.clone()
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Describe every registered metric to the installed recorder.
    /// Seals the registry.
    pub fn describe(&self) {
        for spec in self.specs() {
            match spec.kind {
                MetricKind::Counter => metrics::describe_counter!(spec.name, spec.help),
                MetricKind::Gauge => metrics::describe_gauge!(spec.name, spec.help),
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The control plane's full metric set, registered and ready to
/// describe.
pub fn default_registry() -> Registry {
    let registry = Registry::new();
    let specs = [
        MetricSpec {
            name: names::STORE_WRITES,
            kind: MetricKind::Counter,
            help: "Store upserts, labeled by store",
        },
        MetricSpec {
            name: names::STORE_DELETES,
            kind: MetricKind::Counter,
            help: "Store deletes, labeled by store",
        },
        MetricSpec {
            name: names::STORE_DELIVERIES,
            kind: MetricKind::Counter,
            help: "Deliveries to store subscribers, labeled by store",
        },
        MetricSpec {
            name: names::SNAPSHOT_GENERATIONS,
            kind: MetricKind::Counter,
            help: "Successful snapshot generations",
        },
        MetricSpec {
            name: names::SNAPSHOT_VERSION,
            kind: MetricKind::Gauge,
            help: "Last allocated snapshot version",
        },
        MetricSpec {
            name: names::STREAMS_PRUNED,
            kind: MetricKind::Counter,
            help: "Streams removed by stale pruning",
        },
        MetricSpec {
            name: names::ACTIVE_STREAMS,
            kind: MetricKind::Gauge,
            help: "Streams currently tracked by the snapshot cache",
        },
    ];
    for spec in specs {
        // The registry is freshly built and cannot be sealed yet.
        let _ = registry.register(spec);
    }
    registry
}
