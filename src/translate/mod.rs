//! Translation from declarative routing resources to proxy configuration.
//!
//! # Responsibilities
//! - Merge all routing resources into one proxy-facing `ProxySet`
//! - Resolve backend groups into clusters with parsed endpoint URLs
//! - Report per-resource acceptance status for everything skipped
//!
//! # Design Decisions
//! - Pure function of its input: same resources in, same `ProxySet` out,
//!   safe to call on every notification
//! - Bad elements are skipped and reported, they never fail the whole
//!   translation; only cross-resource name collisions are hard errors
//! - Input is a BTreeMap so output ordering is deterministic

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::resources::{
    Cluster, Endpoint, Listener, ProxySet, ResourceStatus, RouteRule, RoutingResource,
};

/// Hard translation failures. Anything recoverable becomes a
/// `ResourceStatus::Rejected` instead.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("listener {name:?} defined by both {first:?} and {second:?}")]
    DuplicateListener {
        name: String,
        first: String,
        second: String,
    },
}

/// The result of one translation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Merged proxy configuration.
    pub proxy: ProxySet,
    /// Acceptance status per input resource.
    pub statuses: BTreeMap<String, ResourceStatus>,
}

/// Translate the full resource set into one `ProxySet`.
///
/// Empty input yields an empty set, never an error.
pub fn translate(
    resources: &BTreeMap<String, Arc<RoutingResource>>,
) -> Result<Translation, TranslateError> {
    let mut listeners: Vec<Listener> = Vec::new();
    let mut routes: Vec<RouteRule> = Vec::new();
    let mut clusters: BTreeMap<String, Cluster> = BTreeMap::new();
    let mut statuses: BTreeMap<String, ResourceStatus> = BTreeMap::new();

    // Listener names must be unique across the whole resource set.
    let mut listener_owner: HashMap<String, String> = HashMap::new();

    // First pass: build clusters from every backend declaration so
    // routes can reference groups declared in a different resource.
    let mut rejections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (resource_name, resource) in resources {
        for backend in &resource.backends {
            let url = match Url::parse(&format!("http://{}", backend.address)) {
                Ok(url) => url,
                Err(err) => {
                    rejections.entry(resource_name.clone()).or_default().push(
                        format!("backend {:?}: invalid address {:?}: {err}", backend.name, backend.address),
                    );
                    continue;
                }
            };
            clusters
                .entry(backend.group.clone())
                .or_insert_with(|| Cluster {
                    name: backend.group.clone(),
                    endpoints: Vec::new(),
                })
                .endpoints
                .push(Endpoint {
                    url,
                    weight: backend.weight,
                });
        }
    }

    // Second pass: routes and listeners.
    for (resource_name, resource) in resources {
        for route in &resource.routes {
            if !clusters.contains_key(&route.backend_group) {
                rejections.entry(resource_name.clone()).or_default().push(format!(
                    "route {:?}: unknown backend group {:?}",
                    route.name, route.backend_group
                ));
                continue;
            }
            routes.push(RouteRule {
                name: route.name.clone(),
                host: route.host.clone(),
                path_prefix: route.path_prefix.clone(),
                cluster: route.backend_group.clone(),
                priority: route.priority,
            });
        }

        for listener in &resource.listeners {
            if let Some(first) = listener_owner.get(&listener.name) {
                return Err(TranslateError::DuplicateListener {
                    name: listener.name.clone(),
                    first: first.clone(),
                    second: resource_name.clone(),
                });
            }
            listener_owner.insert(listener.name.clone(), resource_name.clone());
            listeners.push(Listener {
                name: listener.name.clone(),
                bind_address: listener.bind_address.clone(),
                routes: Vec::new(),
            });
        }
    }

    // Higher priority first, name as the deterministic tie-break.
    routes.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));

    // Every listener serves the full ordered rule set; per-listener
    // route attachment is a declarative concept this model does not
    // carry yet.
    let route_names: Vec<String> = routes.iter().map(|r| r.name.clone()).collect();
    for listener in &mut listeners {
        listener.routes = route_names.clone();
    }

    for resource_name in resources.keys() {
        let status = match rejections.remove(resource_name) {
            None => ResourceStatus::Accepted,
            Some(reasons) => ResourceStatus::Rejected {
                reason: reasons.join("; "),
            },
        };
        statuses.insert(resource_name.clone(), status);
    }

    Ok(Translation {
        proxy: ProxySet {
            listeners,
            routes,
            clusters: clusters.into_values().collect(),
        },
        statuses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{BackendSpec, ListenerSpec, RouteSpec};

    fn resource(
        listeners: Vec<ListenerSpec>,
        routes: Vec<RouteSpec>,
        backends: Vec<BackendSpec>,
    ) -> Arc<RoutingResource> {
        Arc::new(RoutingResource {
            listeners,
            routes,
            backends,
        })
    }

    fn route(name: &str, group: &str, priority: u32) -> RouteSpec {
        RouteSpec {
            name: name.into(),
            host: None,
            path_prefix: Some("/".into()),
            backend_group: group.into(),
            priority,
        }
    }

    fn backend(name: &str, group: &str, address: &str) -> BackendSpec {
        BackendSpec {
            name: name.into(),
            group: group.into(),
            address: address.into(),
            weight: 1,
        }
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let translation = translate(&BTreeMap::new()).expect("translate");
        assert!(translation.proxy.is_empty());
        assert!(translation.statuses.is_empty());
    }

    #[test]
    fn routes_resolve_groups_across_resources() {
        let mut resources = BTreeMap::new();
        resources.insert(
            "backends".to_string(),
            resource(vec![], vec![], vec![backend("b1", "web", "127.0.0.1:3000")]),
        );
        resources.insert(
            "routes".to_string(),
            resource(vec![], vec![route("r1", "web", 0)], vec![]),
        );

        let translation = translate(&resources).expect("translate");
        assert_eq!(translation.proxy.routes.len(), 1);
        assert_eq!(translation.proxy.clusters.len(), 1);
        assert!(translation.statuses.values().all(|s| s.is_accepted()));
    }

    #[test]
    fn route_to_unknown_group_is_rejected_not_fatal() {
        let mut resources = BTreeMap::new();
        resources.insert(
            "r".to_string(),
            resource(
                vec![],
                vec![route("good", "web", 0), route("bad", "missing", 0)],
                vec![backend("b1", "web", "127.0.0.1:3000")],
            ),
        );

        let translation = translate(&resources).expect("translate");
        assert_eq!(translation.proxy.routes.len(), 1);
        assert_eq!(translation.proxy.routes[0].name, "good");
        match translation.statuses.get("r") {
            Some(ResourceStatus::Rejected { reason }) => {
                assert!(reason.contains("missing"), "reason: {reason}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn invalid_backend_address_is_rejected() {
        let mut resources = BTreeMap::new();
        resources.insert(
            "r".to_string(),
            resource(vec![], vec![], vec![backend("b1", "web", "not a host")]),
        );

        let translation = translate(&resources).expect("translate");
        assert!(translation.proxy.clusters.is_empty());
        assert!(!translation.statuses["r"].is_accepted());
    }

    #[test]
    fn duplicate_listener_is_a_hard_error() {
        let listener = ListenerSpec {
            name: "http".into(),
            bind_address: "0.0.0.0:8080".into(),
        };
        let mut resources = BTreeMap::new();
        resources.insert(
            "a".to_string(),
            resource(vec![listener.clone()], vec![], vec![]),
        );
        resources.insert("b".to_string(), resource(vec![listener], vec![], vec![]));

        match translate(&resources) {
            Err(TranslateError::DuplicateListener { name, .. }) => assert_eq!(name, "http"),
            other => panic!("expected duplicate listener error, got {other:?}"),
        }
    }

    #[test]
    fn routes_sorted_by_priority_then_name() {
        let mut resources = BTreeMap::new();
        resources.insert(
            "r".to_string(),
            resource(
                vec![],
                vec![route("zz", "web", 5), route("aa", "web", 5), route("mm", "web", 9)],
                vec![backend("b1", "web", "127.0.0.1:3000")],
            ),
        );

        let translation = translate(&resources).expect("translate");
        let names: Vec<&str> = translation.proxy.routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["mm", "aa", "zz"]);
    }

    #[test]
    fn translation_is_deterministic() {
        let mut resources = BTreeMap::new();
        resources.insert(
            "r".to_string(),
            resource(
                vec![ListenerSpec {
                    name: "http".into(),
                    bind_address: "0.0.0.0:8080".into(),
                }],
                vec![route("r1", "web", 0)],
                vec![backend("b1", "web", "127.0.0.1:3000")],
            ),
        );

        let first = translate(&resources).expect("translate");
        let second = translate(&resources).expect("translate");
        assert_eq!(first, second);
    }
}
