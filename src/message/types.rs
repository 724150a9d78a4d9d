//! Typed store bundles wired between the pipeline stages.

use std::sync::Arc;

use crate::message::VersionedStore;
use crate::resources::{ProxySet, ResourceStatus, RoutingResource};

/// Key under which the translator publishes the merged proxy
/// configuration. There is one merged output per control plane.
pub const TRANSLATED_CONFIG_KEY: &str = "default";

/// Stores populated by the resource provider and annotated by the
/// translator.
#[derive(Clone)]
pub struct ProviderResources {
    /// Declarative routing resources, keyed by resource name.
    pub routing: VersionedStore<String, Arc<RoutingResource>>,

    /// Per-resource acceptance status written back by the translator.
    pub statuses: VersionedStore<String, ResourceStatus>,
}

impl ProviderResources {
    pub fn new() -> Self {
        Self {
            routing: VersionedStore::new("provider_routing"),
            statuses: VersionedStore::new("resource_statuses"),
        }
    }

    /// Close every store in the bundle, ending all subscriptions.
    pub fn close(&self) {
        self.routing.close();
        self.statuses.close();
    }
}

impl Default for ProviderResources {
    fn default() -> Self {
        Self::new()
    }
}

/// Store carrying the proxy-ready configuration from the translator to
/// the serving stage.
#[derive(Clone)]
pub struct TranslatedConfig {
    /// The merged proxy configuration under [`TRANSLATED_CONFIG_KEY`].
    pub proxy: VersionedStore<String, Arc<ProxySet>>,
}

impl TranslatedConfig {
    pub fn new() -> Self {
        Self {
            proxy: VersionedStore::new("translated_proxy"),
        }
    }

    /// Convenience read of the merged proxy configuration, empty when
    /// nothing has been translated yet.
    pub fn current(&self) -> ProxySet {
        self.proxy
            .load(&TRANSLATED_CONFIG_KEY.to_string())
            .map(|set| (*set).clone())
            .unwrap_or_default()
    }

    pub fn close(&self) {
        self.proxy.close();
    }
}

impl Default for TranslatedConfig {
    fn default() -> Self {
        Self::new()
    }
}
