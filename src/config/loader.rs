//! Configuration loading from disk.

use std::path::Path;

use thiserror::Error;

use crate::config::schema::ControlPlaneConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControlPlaneConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: ControlPlaneConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_round_trips_a_valid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("control-plane.toml");
        std::fs::write(
            &path,
            r#"
            [provider]
            resource_dir = "/var/lib/route-control"

            [serving]
            prune_interval_secs = 10
            stale_stream_secs = 45
            "#,
        )
        .expect("write");

        let config = load_config(&path).expect("load");
        assert_eq!(config.serving.prune_interval_secs, 10);
        assert_eq!(config.serving.stale_stream_secs, 45);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("control-plane.toml");
        std::fs::write(
            &path,
            r#"
            [serving]
            prune_interval_secs = 0
            "#,
        )
        .expect("write");

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/config.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
