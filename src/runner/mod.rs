//! Pipeline stage ("runner") composition.
//!
//! # Responsibilities
//! - Define the Runner contract every pipeline stage implements
//! - Spawn one task per runner and keep its join handle
//! - Shut down by signalling and then *joining* every task
//!
//! # Design Decisions
//! - Runners are decoupled: a runner only reads/writes shared stores,
//!   never calls another runner
//! - `shutdown_all` must not return before every task has exited;
//!   returning early races the lifetime of shared resources such as
//!   the logging subscriber

pub mod provider;
pub mod serving;
pub mod translator;

pub use provider::ProviderRunner;
pub use serving::ServingRunner;
pub use translator::TranslatorRunner;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::lifecycle::Shutdown;

/// A named unit of pipeline work. `start` spawns the runner's task and
/// returns once it is scheduled; the task must exit promptly after the
/// shutdown receiver fires.
pub trait Runner: Send + 'static {
    fn name(&self) -> &'static str;

    fn start(self: Box<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()>;
}

/// Owns the registered runners and their spawned tasks.
pub struct RunnerManager {
    shutdown: Shutdown,
    pending: Vec<Box<dyn Runner>>,
    running: Vec<(&'static str, JoinHandle<()>)>,
}

impl RunnerManager {
    pub fn new() -> Self {
        Self {
            shutdown: Shutdown::new(),
            pending: Vec::new(),
            running: Vec::new(),
        }
    }

    /// Register a runner. Has no effect until `start_all`.
    pub fn register(&mut self, runner: Box<dyn Runner>) {
        info!(runner = runner.name(), "registered runner");
        self.pending.push(runner);
    }

    /// Names of all runners, registered or running.
    pub fn names(&self) -> Vec<&'static str> {
        self.pending
            .iter()
            .map(|r| r.name())
            .chain(self.running.iter().map(|(name, _)| *name))
            .collect()
    }

    /// Spawn every registered runner. Non-blocking: returns once each
    /// task is scheduled.
    pub fn start_all(&mut self) {
        for runner in self.pending.drain(..) {
            let name = runner.name();
            info!(runner = name, "starting runner");
            let handle = runner.start(self.shutdown.subscribe());
            self.running.push((name, handle));
        }
    }

    /// Signal shutdown and join every runner task before returning.
    ///
    /// The join is the contract, not a nicety: callers release shared
    /// resources (logger, stores) right after this returns.
    pub async fn shutdown_all(&mut self) {
        info!(runners = self.running.len(), "shutting down all runners");
        self.shutdown.trigger();
        for (name, handle) in self.running.drain(..) {
            match handle.await {
                Ok(()) => info!(runner = name, "runner stopped"),
                Err(err) => error!(runner = name, %err, "runner task failed"),
            }
        }
    }
}

impl Default for RunnerManager {
    fn default() -> Self {
        Self::new()
    }
}
