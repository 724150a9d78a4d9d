//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ControlPlaneConfig (validated, immutable)
//!     → shared by value at startup
//! ```
//!
//! # Design Decisions
//! - The control plane's own config is static for the process lifetime;
//!   only the *routing resources* hot-reload (see runner::provider)
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ControlPlaneConfig, ObservabilityConfig, ProviderConfig, ServingConfig};
pub use validation::{validate_config, ValidationError};
