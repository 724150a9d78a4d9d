//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! control plane. All types derive Serde traits for deserialization
//! from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Resource provider settings.
    pub provider: ProviderConfig,

    /// Snapshot serving and stream pruning settings.
    pub serving: ServingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Resource provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Directory holding declarative routing resource files.
    pub resource_dir: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            resource_dir: PathBuf::from("resources"),
        }
    }
}

/// Serving-side configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServingConfig {
    /// How often to sweep for stale streams, in seconds.
    pub prune_interval_secs: u64,

    /// Streams silent for longer than this are pruned, in seconds.
    pub stale_stream_secs: u64,
}

impl ServingConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_stream_secs)
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: 30,
            stale_stream_secs: 120,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter when RUST_LOG is unset.
    pub log_filter: String,

    /// Whether to describe and emit metrics.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "route_control=info".to_string(),
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.provider.resource_dir, PathBuf::from("resources"));
        assert_eq!(config.serving.prune_interval(), Duration::from_secs(30));
        assert_eq!(config.serving.stale_after(), Duration::from_secs(120));
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let config: ControlPlaneConfig = toml::from_str(
            r#"
            [provider]
            resource_dir = "/etc/route-control/resources"
            "#,
        )
        .expect("valid config");
        assert_eq!(
            config.provider.resource_dir,
            PathBuf::from("/etc/route-control/resources")
        );
        assert_eq!(config.serving.prune_interval_secs, 30);
    }
}
