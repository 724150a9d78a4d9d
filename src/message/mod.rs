//! Inter-stage message bus.
//!
//! # Data Flow
//! ```text
//! provider runner ──store──▶ ProviderResources.routing
//!                                │ subscribe
//!                                ▼
//!                          translator runner ──store──▶ TranslatedConfig.proxy
//!                                │ statuses                   │ subscribe
//!                                ▼                            ▼
//!                          ProviderResources.statuses   serving runner
//! ```
//!
//! # Design Decisions
//! - Stages never call each other; every hand-off goes through a store
//! - Stores own their entries; values are shared via Arc where large

pub mod store;
pub mod types;

pub use store::{Event, Subscription, Update, VersionedStore};
pub use types::{ProviderResources, TranslatedConfig, TRANSLATED_CONFIG_KEY};
