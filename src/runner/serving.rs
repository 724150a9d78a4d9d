//! Serving stage.
//!
//! Subscribes to the translated proxy configuration and regenerates
//! the snapshot cache on every change; also owns the periodic
//! stale-stream prune tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::cache::SnapshotCache;
use crate::message::TranslatedConfig;
use crate::runner::Runner;

/// Feeds the snapshot cache and prunes silent streams.
pub struct ServingRunner {
    translated: TranslatedConfig,
    cache: Arc<SnapshotCache>,
    prune_interval: Duration,
}

impl ServingRunner {
    pub fn new(
        translated: TranslatedConfig,
        cache: Arc<SnapshotCache>,
        prune_interval: Duration,
    ) -> Self {
        Self {
            translated,
            cache,
            prune_interval,
        }
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut sub = self.translated.proxy.subscribe();
        let mut prune_tick = tokio::time::interval(self.prune_interval);
        // A missed prune cycle is safe to skip; do not burst to catch up.
        prune_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("serving runner shutting down");
                    break;
                }
                event = sub.recv() => match event {
                    Some(_) => self.regenerate(),
                    None => {
                        info!("translated store closed, serving runner stopping");
                        break;
                    }
                },
                _ = prune_tick.tick() => {
                    let pruned = self.cache.prune_stale_streams(Instant::now());
                    if pruned > 0 {
                        info!(pruned, "pruned stale streams");
                    }
                }
            }
        }
    }

    /// Push the current translated config into the cache as a new
    /// snapshot. A failed generation keeps the previous snapshot
    /// authoritative.
    fn regenerate(&self) {
        let resources = self.translated.current();
        match self.cache.generate_new_snapshot(resources) {
            Ok(version) => debug!(version, "snapshot regenerated"),
            Err(err) => error!(%err, "snapshot generation failed, previous snapshot stays"),
        }
    }
}

impl Runner for ServingRunner {
    fn name(&self) -> &'static str {
        "serving"
    }

    fn start(self: Box<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
