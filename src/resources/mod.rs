//! Resource model: declarative routing input and proxy-facing output.
//!
//! # Data Flow
//! ```text
//! RoutingResource (declarative, one per file)
//!     → translate::translate()
//!     → ProxySet (proxy-ready listeners/routes/clusters)
//!     → SnapshotCache (versioned, served per node)
//! ```
//!
//! # Design Decisions
//! - Input resources are plain serde structs; no admission logic lives here
//! - ProxySet is immutable once built and shared via Arc downstream
//! - Endpoint addresses are parsed into full URLs at translation time

use serde::{Deserialize, Serialize};
use url::Url;

/// One declarative routing resource, typically loaded from a single
/// TOML or JSON file in the resource directory.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RoutingResource {
    /// Listeners this resource wants the proxy to open.
    pub listeners: Vec<ListenerSpec>,

    /// Route definitions mapping requests to backend groups.
    pub routes: Vec<RouteSpec>,

    /// Backend server definitions.
    pub backends: Vec<BackendSpec>,
}

/// Listener declaration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ListenerSpec {
    /// Unique listener identifier.
    pub name: String,

    /// Bind address the proxy should listen on (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

/// Route declaration mapping requests to a backend group.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteSpec {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Backend group name to forward to.
    pub backend_group: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Backend server declaration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendSpec {
    /// Unique backend identifier.
    pub name: String,

    /// Backend group this server belongs to.
    pub group: String,

    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Acceptance status the translator reports back for a resource.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum ResourceStatus {
    /// The resource translated cleanly.
    Accepted,
    /// The resource (or part of it) was skipped; reason is human-readable.
    Rejected { reason: String },
}

impl ResourceStatus {
    /// Returns true if the resource was accepted without reservations.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ResourceStatus::Accepted)
    }
}

/// The complete proxy-facing configuration derived from all routing
/// resources. Built by the translator, consumed by the snapshot cache.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProxySet {
    pub listeners: Vec<Listener>,
    pub routes: Vec<RouteRule>,
    pub clusters: Vec<Cluster>,
}

impl ProxySet {
    /// Returns true if the set carries no configuration at all.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.routes.is_empty() && self.clusters.is_empty()
    }

    /// Returns true if any listener, route rule, or cluster carries
    /// the given name. Used as an existence probe by authorization.
    pub fn contains_key(&self, key: &str) -> bool {
        self.listeners.iter().any(|l| l.name == key)
            || self.routes.iter().any(|r| r.name == key)
            || self.clusters.iter().any(|c| c.name == key)
    }
}

/// A proxy listener with the route rules attached to it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Listener {
    pub name: String,
    pub bind_address: String,
    /// Names of the route rules served on this listener, in match order.
    pub routes: Vec<String>,
}

/// A single proxy-ready route rule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteRule {
    pub name: String,
    pub host: Option<String>,
    pub path_prefix: Option<String>,
    /// Target cluster name.
    pub cluster: String,
    pub priority: u32,
}

/// A load-balanceable set of endpoints, one per backend group.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

/// One upstream endpoint inside a cluster.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Endpoint {
    /// Full upstream URL, pre-parsed so the proxy never has to.
    pub url: Url,
    pub weight: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_set_contains_key_checks_all_collections() {
        let set = ProxySet {
            listeners: vec![Listener {
                name: "http".into(),
                bind_address: "0.0.0.0:8080".into(),
                routes: vec!["r1".into()],
            }],
            routes: vec![RouteRule {
                name: "r1".into(),
                host: None,
                path_prefix: Some("/".into()),
                cluster: "web".into(),
                priority: 0,
            }],
            clusters: vec![Cluster {
                name: "web".into(),
                endpoints: vec![],
            }],
        };

        assert!(set.contains_key("http"));
        assert!(set.contains_key("r1"));
        assert!(set.contains_key("web"));
        assert!(!set.contains_key("missing"));
    }

    #[test]
    fn routing_resource_deserializes_with_defaults() {
        let res: RoutingResource = toml::from_str(
            r#"
            [[routes]]
            name = "r1"
            path_prefix = "/api"
            backend_group = "web"

            [[backends]]
            name = "b1"
            group = "web"
            address = "127.0.0.1:3000"
            "#,
        )
        .expect("valid resource");

        assert!(res.listeners.is_empty());
        assert_eq!(res.routes[0].priority, 0);
        assert_eq!(res.backends[0].weight, 1);
    }
}
