//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0)
//! - Catch threshold combinations that silently disable pruning
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function over the parsed config
//! - Runs before the config is accepted into the system

use thiserror::Error;

use crate::config::schema::ControlPlaneConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("provider.resource_dir must not be empty")]
    EmptyResourceDir,

    #[error("serving.prune_interval_secs must be greater than zero")]
    ZeroPruneInterval,

    #[error("serving.stale_stream_secs must be greater than zero")]
    ZeroStaleThreshold,

    #[error(
        "serving.stale_stream_secs ({stale}) must not be shorter than \
         serving.prune_interval_secs ({prune}); streams would be pruned \
         between normal keepalives"
    )]
    StaleShorterThanPrune { stale: u64, prune: u64 },
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ControlPlaneConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.provider.resource_dir.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyResourceDir);
    }
    if config.serving.prune_interval_secs == 0 {
        errors.push(ValidationError::ZeroPruneInterval);
    }
    if config.serving.stale_stream_secs == 0 {
        errors.push(ValidationError::ZeroStaleThreshold);
    }
    if config.serving.stale_stream_secs > 0
        && config.serving.prune_interval_secs > 0
        && config.serving.stale_stream_secs < config.serving.prune_interval_secs
    {
        errors.push(ValidationError::StaleShorterThanPrune {
            stale: config.serving.stale_stream_secs,
            prune: config.serving.prune_interval_secs,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ControlPlaneConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = ControlPlaneConfig::default();
        config.provider.resource_dir = "".into();
        config.serving.prune_interval_secs = 0;
        config.serving.stale_stream_secs = 0;

        let errors = validate_config(&config).expect_err("invalid config");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn stale_threshold_shorter_than_prune_interval_is_rejected() {
        let mut config = ControlPlaneConfig::default();
        config.serving.prune_interval_secs = 60;
        config.serving.stale_stream_secs = 10;

        let errors = validate_config(&config).expect_err("invalid config");
        assert_eq!(
            errors,
            vec![ValidationError::StaleShorterThanPrune {
                stale: 10,
                prune: 60
            }]
        );
    }
}
