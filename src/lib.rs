//! Declarative routing control plane.
//!
//! Watches declarative routing configuration, translates it into
//! proxy-facing configuration, and continuously serves the latest
//! versioned snapshot to every connecting proxy instance.
//!
//! # Architecture Overview
//!
//! ```text
//!  resource files          ┌──────────────────────────────────────────────┐
//!  (*.toml / *.json)       │               CONTROL PLANE                  │
//!  ───────────────────────▶│  ┌──────────┐      ┌────────────┐            │
//!                          │  │ provider │─────▶│  routing   │            │
//!                          │  │  runner  │store │   store    │            │
//!                          │  └──────────┘      └─────┬──────┘            │
//!                          │                          │ subscribe         │
//!                          │                          ▼                   │
//!                          │                   ┌────────────┐             │
//!                          │                   │ translator │──▶ statuses │
//!                          │                   │   runner   │             │
//!                          │                   └─────┬──────┘             │
//!                          │                    store│                    │
//!                          │                         ▼                    │
//!                          │  ┌──────────┐     ┌────────────┐             │
//!  proxy fleet             │  │ snapshot │◀────│  serving   │             │
//!  (discovery streams) ◀───┼──│  cache   │     │   runner   │◀─ prune ──┐ │
//!                          │  └──────────┘     └────────────┘   tick    │ │
//!                          │                                   ─────────┘ │
//!                          └──────────────────────────────────────────────┘
//! ```
//!
//! Stages never call each other: every hand-off goes through a
//! [`message::VersionedStore`], and the wire-level discovery server is
//! an external collaborator that reads [`cache::SnapshotCache`] and
//! reports stream lifecycle back into it.

// Core state propagation
pub mod cache;
pub mod message;
pub mod runner;

// Resource model and translation
pub mod resources;
pub mod translate;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use cache::{SnapshotCache, StreamEvent};
pub use config::ControlPlaneConfig;
pub use lifecycle::Shutdown;
pub use message::{ProviderResources, TranslatedConfig, VersionedStore};
pub use runner::RunnerManager;
