//! Per-node snapshot cache.
//!
//! # Responsibilities
//! - Build monotonically versioned snapshots from translated config
//! - Track live streams and the node identity each one binds to
//! - Hand every known node the latest snapshot
//! - Prune streams that went silent without a clean close
//!
//! # State Machines
//! ```text
//! Node:   Unknown → Known(no snapshot) → Known(has snapshot)
//! Stream: Opened(node="") → Bound(node=x) → Closed
//! ```
//!
//! # Design Decisions
//! - One mutex guards all bookkeeping; snapshot generation and pruning
//!   take the same lock so a node's assignment never regresses
//! - Versions are a per-process counter, not content hashes; strict
//!   ordering is the only property the discovery protocol needs
//! - A node's last assignment survives its streams closing, so a
//!   reconnect resumes from its latest state instead of re-bootstrapping

mod events;

pub use events::StreamEvent;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::observability::metrics::names;
use crate::resources::ProxySet;

/// Cache-level failures. Stream bookkeeping that merely has nothing to
/// do (unknown node, no snapshot yet) is deliberately not an error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("couldn't get the node ID from the first request on stream {0}")]
    EmptyNodeId(i64),

    #[error("request on stream {0} which was never opened")]
    UnknownStream(i64),

    #[error("route rule {rule:?} references unknown cluster {cluster:?}")]
    UnknownCluster { rule: String, cluster: String },

    #[error("listener {listener:?} references unknown route rule {rule:?}")]
    UnknownRouteRule { listener: String, rule: String },

    #[error("duplicate cluster name {0:?}")]
    DuplicateCluster(String),
}

/// An immutable, versioned bundle of proxy-ready configuration.
///
/// Snapshots are never mutated in place; nodes share them via Arc.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    version: u64,
    resources: ProxySet,
}

impl Snapshot {
    /// Build a snapshot, validating internal references. On error the
    /// caller's previous snapshot stays authoritative.
    fn build(version: u64, resources: ProxySet) -> Result<Self, CacheError> {
        let mut cluster_names = HashMap::new();
        for cluster in &resources.clusters {
            if cluster_names.insert(cluster.name.clone(), ()).is_some() {
                return Err(CacheError::DuplicateCluster(cluster.name.clone()));
            }
        }
        for rule in &resources.routes {
            if !cluster_names.contains_key(&rule.cluster) {
                return Err(CacheError::UnknownCluster {
                    rule: rule.name.clone(),
                    cluster: rule.cluster.clone(),
                });
            }
        }
        for listener in &resources.listeners {
            for rule in &listener.routes {
                if !resources.routes.iter().any(|r| &r.name == rule) {
                    return Err(CacheError::UnknownRouteRule {
                        listener: listener.name.clone(),
                        rule: rule.clone(),
                    });
                }
            }
        }
        Ok(Self { version, resources })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn resources(&self) -> &ProxySet {
        &self.resources
    }
}

/// Bookkeeping for one live stream.
#[derive(Debug)]
struct StreamInfo {
    /// Bound node identity; None until the first request arrives.
    node_id: Option<String>,
    opened_at: Instant,
    last_activity: Instant,
}

struct CacheInner {
    /// Last allocated version; 0 means no snapshot has ever been built.
    version: u64,
    last_snapshot: Option<Arc<Snapshot>>,
    /// Current snapshot per node. Entries outlive the node's streams.
    node_snapshots: HashMap<String, Arc<Snapshot>>,
    streams: HashMap<i64, StreamInfo>,
    /// Refcount of live streams bound to each node. An entry vanishes
    /// at zero, which is how the cache knows a node lost its last
    /// observer without scanning all streams.
    node_frequency: HashMap<String, usize>,
}

impl CacheInner {
    /// Decrement a node's stream refcount, dropping the entry at zero.
    /// The node's snapshot assignment is intentionally left in place.
    fn release_node(&mut self, node_id: Option<String>) {
        let Some(node_id) = node_id else { return };
        if let Some(count) = self.node_frequency.get_mut(&node_id) {
            *count -= 1;
            if *count == 0 {
                self.node_frequency.remove(&node_id);
                debug!(node = %node_id, "node has no live streams left");
            }
        }
    }
}

/// Serving-side snapshot cache consumed by the discovery protocol
/// server. All methods are safe to call from any task.
pub struct SnapshotCache {
    inner: Mutex<CacheInner>,
    stale_after: Duration,
}

impl SnapshotCache {
    /// Create an empty cache. Streams silent for longer than
    /// `stale_after` become eligible for pruning.
    pub fn new(stale_after: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                version: 0,
                last_snapshot: None,
                node_snapshots: HashMap::new(),
                streams: HashMap::new(),
                node_frequency: HashMap::new(),
            }),
            stale_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the next snapshot from translated resources and assign it
    /// to every node currently observed by at least one live stream.
    ///
    /// Holds the cache lock for the whole operation so concurrent
    /// generations cannot interleave and hand a node an older version
    /// than one it already has. Returns the allocated version.
    pub fn generate_new_snapshot(&self, resources: ProxySet) -> Result<u64, CacheError> {
        let mut inner = self.lock();

        // The version wraps to 1 at the maximum representable value;
        // 0 stays reserved for "never generated".
        let version = if inner.version == u64::MAX {
            1
        } else {
            inner.version + 1
        };

        // Validate before touching any state: a bad resource set must
        // not blank out a previously-good snapshot or burn a version.
        let snapshot = Arc::new(Snapshot::build(version, resources)?);

        inner.version = version;
        inner.last_snapshot = Some(Arc::clone(&snapshot));

        let CacheInner {
            node_frequency,
            node_snapshots,
            ..
        } = &mut *inner;
        for node in node_frequency.keys() {
            debug!(node = %node, version, "assigning snapshot");
            node_snapshots.insert(node.clone(), Arc::clone(&snapshot));
        }

        metrics::counter!(names::SNAPSHOT_GENERATIONS).increment(1);
        metrics::gauge!(names::SNAPSHOT_VERSION).set(version as f64);
        info!(version, nodes = node_frequency.len(), "generated new snapshot");
        Ok(version)
    }

    /// Register a newly opened stream with no node bound yet.
    pub fn on_stream_open(&self, stream_id: i64) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.streams.insert(
            stream_id,
            StreamInfo {
                node_id: None,
                opened_at: now,
                last_activity: now,
            },
        );
        metrics::gauge!(names::ACTIVE_STREAMS).set(inner.streams.len() as f64);
        debug!(stream = stream_id, "stream opened");
    }

    /// Record an inbound request on a stream, binding it to `node_id`
    /// on first sight.
    ///
    /// With no snapshot generated yet this succeeds without assigning
    /// anything; the node is caught up by the next generation. With a
    /// snapshot present and the node never assigned one, the node is
    /// seeded with the latest snapshot immediately.
    pub fn on_stream_request(&self, stream_id: i64, node_id: &str) -> Result<(), CacheError> {
        let mut inner = self.lock();
        let CacheInner {
            streams,
            node_frequency,
            node_snapshots,
            last_snapshot,
            ..
        } = &mut *inner;

        let Some(stream) = streams.get_mut(&stream_id) else {
            return Err(CacheError::UnknownStream(stream_id));
        };
        stream.last_activity = Instant::now();

        let node = match &stream.node_id {
            Some(bound) => bound.clone(),
            None => {
                // Only the first request on a stream is guaranteed to
                // carry the node identity.
                if node_id.is_empty() {
                    return Err(CacheError::EmptyNodeId(stream_id));
                }
                debug!(stream = stream_id, node = %node_id, "first request, binding node");
                stream.node_id = Some(node_id.to_string());
                *node_frequency.entry(node_id.to_string()).or_insert(0) += 1;
                node_id.to_string()
            }
        };

        let Some(latest) = last_snapshot else {
            // Nothing to serve yet; answer silently rather than error.
            debug!(stream = stream_id, node = %node, "request before first snapshot");
            return Ok(());
        };

        if !node_snapshots.contains_key(&node) {
            debug!(node = %node, version = latest.version(), "seeding node with latest snapshot");
            node_snapshots.insert(node, Arc::clone(latest));
        }

        Ok(())
    }

    /// Record outbound activity on a stream. Unknown streams (already
    /// closed or pruned) are a no-op.
    pub fn on_stream_response(&self, stream_id: i64) {
        let mut inner = self.lock();
        if let Some(stream) = inner.streams.get_mut(&stream_id) {
            stream.last_activity = Instant::now();
        }
    }

    /// Tear down a stream's bookkeeping. Idempotent: closing an unknown
    /// or already-pruned stream is a no-op.
    pub fn on_stream_closed(&self, stream_id: i64) {
        let mut inner = self.lock();
        let Some(stream) = inner.streams.remove(&stream_id) else {
            return;
        };
        debug!(
            stream = stream_id,
            lived = ?stream.opened_at.elapsed(),
            "stream closed"
        );
        inner.release_node(stream.node_id);
        metrics::gauge!(names::ACTIVE_STREAMS).set(inner.streams.len() as f64);
    }

    /// Drop every stream whose last activity is older than the
    /// staleness threshold, releasing node refcounts exactly as a
    /// clean close would. Returns the number of streams pruned.
    ///
    /// A stream can die without a close notification (network
    /// partition); without this it would leak a refcount forever.
    pub fn prune_stale_streams(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let stale: Vec<i64> = inner
            .streams
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_activity) > self.stale_after)
            .map(|(id, _)| *id)
            .collect();

        for stream_id in &stale {
            if let Some(stream) = inner.streams.remove(stream_id) {
                info!(stream = *stream_id, node = ?stream.node_id, "pruning stale stream");
                inner.release_node(stream.node_id);
            }
        }

        if !stale.is_empty() {
            metrics::counter!(names::STREAMS_PRUNED).increment(stale.len() as u64);
            metrics::gauge!(names::ACTIVE_STREAMS).set(inner.streams.len() as f64);
        }
        stale.len()
    }

    /// The latest generated snapshot, if any.
    pub fn last_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.lock().last_snapshot.clone()
    }

    /// The snapshot currently assigned to a node.
    pub fn node_snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        self.lock().node_snapshots.get(node_id).cloned()
    }

    /// Existence probe against the latest snapshot, used by the
    /// external authorization collaborator to corroborate a presented
    /// identity against configuration the cache actually knows.
    pub fn snapshot_has_resource_key(&self, key: &str) -> bool {
        self.lock()
            .last_snapshot
            .as_ref()
            .map(|s| s.resources().contains_key(key))
            .unwrap_or(false)
    }

    /// True while at least one live stream is bound to the node.
    pub fn node_is_observed(&self, node_id: &str) -> bool {
        self.lock().node_frequency.contains_key(node_id)
    }

    /// Number of streams currently tracked.
    pub fn stream_count(&self) -> usize {
        self.lock().streams.len()
    }

    /// Last allocated snapshot version; 0 before the first generation.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    #[cfg(test)]
    fn set_version(&self, version: u64) {
        self.lock().version = version;
    }

    #[cfg(test)]
    pub(crate) fn backdate_stream(&self, stream_id: i64, by: Duration) {
        let mut inner = self.lock();
        if let Some(stream) = inner.streams.get_mut(&stream_id) {
            stream.last_activity -= by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Cluster, Listener, RouteRule};

    fn cache() -> SnapshotCache {
        SnapshotCache::new(Duration::from_secs(60))
    }

    fn resources(cluster: &str) -> ProxySet {
        ProxySet {
            listeners: vec![],
            routes: vec![],
            clusters: vec![Cluster {
                name: cluster.into(),
                endpoints: vec![],
            }],
        }
    }

    #[test]
    fn versions_are_monotonic_from_one() {
        let cache = cache();
        for expected in 1..=5 {
            let version = cache
                .generate_new_snapshot(resources("web"))
                .expect("generate");
            assert_eq!(version, expected);
        }
        assert_eq!(cache.version(), 5);
    }

    #[test]
    fn version_wraps_to_one_at_max() {
        let cache = cache();
        cache.set_version(u64::MAX);
        let version = cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");
        assert_eq!(version, 1);
    }

    #[test]
    fn failed_generation_keeps_previous_snapshot_and_version() {
        let cache = cache();
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");

        let bad = ProxySet {
            listeners: vec![],
            routes: vec![RouteRule {
                name: "r1".into(),
                host: None,
                path_prefix: None,
                cluster: "missing".into(),
                priority: 0,
            }],
            clusters: vec![],
        };
        assert!(matches!(
            cache.generate_new_snapshot(bad),
            Err(CacheError::UnknownCluster { .. })
        ));

        // The prior snapshot stays authoritative and no version burned.
        assert_eq!(cache.version(), 1);
        let last = cache.last_snapshot().expect("snapshot");
        assert_eq!(last.version(), 1);
        assert!(last.resources().contains_key("web"));
    }

    #[test]
    fn duplicate_cluster_is_rejected() {
        let cache = cache();
        let bad = ProxySet {
            listeners: vec![],
            routes: vec![],
            clusters: vec![
                Cluster {
                    name: "web".into(),
                    endpoints: vec![],
                },
                Cluster {
                    name: "web".into(),
                    endpoints: vec![],
                },
            ],
        };
        assert!(matches!(
            cache.generate_new_snapshot(bad),
            Err(CacheError::DuplicateCluster(_))
        ));
    }

    #[test]
    fn listener_referencing_unknown_rule_is_rejected() {
        let cache = cache();
        let bad = ProxySet {
            listeners: vec![Listener {
                name: "http".into(),
                bind_address: "0.0.0.0:8080".into(),
                routes: vec!["ghost".into()],
            }],
            routes: vec![],
            clusters: vec![],
        };
        assert!(matches!(
            cache.generate_new_snapshot(bad),
            Err(CacheError::UnknownRouteRule { .. })
        ));
    }

    #[test]
    fn request_before_first_snapshot_is_silent_success() {
        let cache = cache();
        cache.on_stream_open(42);
        cache
            .on_stream_request(42, "proxy-7")
            .expect("request succeeds with no snapshot");
        assert!(cache.node_snapshot("proxy-7").is_none());

        // The next generation catches the node up.
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");
        let snapshot = cache.node_snapshot("proxy-7").expect("assigned");
        assert_eq!(snapshot.version(), 1);
    }

    #[test]
    fn late_node_is_seeded_with_latest_snapshot() {
        let cache = cache();
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");

        // Node connects between generations and is seeded immediately.
        cache.on_stream_open(7);
        cache.on_stream_request(7, "proxy-1").expect("request");
        let snapshot = cache.node_snapshot("proxy-1").expect("assigned");
        assert_eq!(snapshot.version(), 2);
    }

    #[test]
    fn node_assignment_never_regresses() {
        let cache = cache();
        cache.on_stream_open(1);
        cache.on_stream_request(1, "proxy-1").expect("request");

        let mut last_seen = 0;
        for _ in 0..10 {
            cache
                .generate_new_snapshot(resources("web"))
                .expect("generate");
            let version = cache.node_snapshot("proxy-1").expect("assigned").version();
            assert!(version >= last_seen, "version regressed: {version} < {last_seen}");
            last_seen = version;
        }
    }

    #[test]
    fn empty_node_id_on_first_request_is_an_error() {
        let cache = cache();
        cache.on_stream_open(1);
        assert!(matches!(
            cache.on_stream_request(1, ""),
            Err(CacheError::EmptyNodeId(1))
        ));
    }

    #[test]
    fn request_on_unopened_stream_is_an_error() {
        let cache = cache();
        assert!(matches!(
            cache.on_stream_request(99, "proxy-1"),
            Err(CacheError::UnknownStream(99))
        ));
    }

    #[test]
    fn later_requests_keep_first_binding() {
        let cache = cache();
        cache.on_stream_open(1);
        cache.on_stream_request(1, "proxy-1").expect("bind");
        // Subsequent requests commonly carry no node; the binding holds.
        cache.on_stream_request(1, "").expect("rebind no-op");
        assert!(cache.node_is_observed("proxy-1"));
    }

    #[test]
    fn close_releases_refcount_but_keeps_assignment() {
        let cache = cache();
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");
        cache.on_stream_open(1);
        cache.on_stream_request(1, "proxy-3").expect("request");
        assert!(cache.node_is_observed("proxy-3"));

        cache.on_stream_closed(1);
        assert!(!cache.node_is_observed("proxy-3"));
        // The last assignment survives for a future reconnect.
        assert!(cache.node_snapshot("proxy-3").is_some());

        // Closing again is a no-op.
        cache.on_stream_closed(1);
        assert!(!cache.node_is_observed("proxy-3"));
    }

    #[test]
    fn two_streams_one_node_refcounts_correctly() {
        let cache = cache();
        cache.on_stream_open(1);
        cache.on_stream_open(2);
        cache.on_stream_request(1, "proxy-1").expect("request");
        cache.on_stream_request(2, "proxy-1").expect("request");

        cache.on_stream_closed(1);
        assert!(cache.node_is_observed("proxy-1"));
        cache.on_stream_closed(2);
        assert!(!cache.node_is_observed("proxy-1"));
    }

    #[test]
    fn prune_is_conservative_and_idempotent() {
        let threshold = Duration::from_secs(60);
        let cache = SnapshotCache::new(threshold);
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");
        cache.on_stream_open(9);
        cache.on_stream_request(9, "proxy-3").expect("request");

        // Within the threshold: nothing is pruned.
        assert_eq!(cache.prune_stale_streams(Instant::now()), 0);
        assert!(cache.node_is_observed("proxy-3"));

        // Past the threshold: the stream goes, the refcount drops once,
        // but the node's last snapshot stays retrievable.
        let later = Instant::now() + threshold + Duration::from_secs(1);
        assert_eq!(cache.prune_stale_streams(later), 1);
        assert!(!cache.node_is_observed("proxy-3"));
        assert!(cache.node_snapshot("proxy-3").is_some());
        assert_eq!(cache.stream_count(), 0);

        // Pruning again without new activity changes nothing.
        assert_eq!(cache.prune_stale_streams(later), 0);
    }

    #[test]
    fn activity_refreshes_prune_clock() {
        let threshold = Duration::from_secs(60);
        let cache = SnapshotCache::new(threshold);
        cache.on_stream_open(1);
        cache.on_stream_request(1, "proxy-1").expect("request");

        // A response touch now keeps the stream alive relative to a
        // prune cycle measured from the original open.
        cache.on_stream_response(1);
        assert_eq!(cache.prune_stale_streams(Instant::now()), 0);
        assert_eq!(cache.stream_count(), 1);
    }

    #[test]
    fn snapshot_has_resource_key_queries_latest() {
        let cache = cache();
        assert!(!cache.snapshot_has_resource_key("web"));
        cache
            .generate_new_snapshot(resources("web"))
            .expect("generate");
        assert!(cache.snapshot_has_resource_key("web"));
        assert!(!cache.snapshot_has_resource_key("db"));
    }
}
