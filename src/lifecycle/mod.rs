//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build stores & cache → Start runners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → trigger broadcast → join every runner task
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown is awaited, never fire-and-forget: the manager joins all
//!   runner tasks before the process releases shared resources

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
