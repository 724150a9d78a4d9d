//! Translation stage.
//!
//! Subscribes to the routing resource store and, on every notification,
//! recomputes the entire proxy configuration rather than patching it
//! incrementally. Input sets are small relative to notification
//! frequency, so full recomputation buys a much simpler correctness
//! argument for modest CPU.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::message::{ProviderResources, TranslatedConfig, TRANSLATED_CONFIG_KEY};
use crate::runner::Runner;
use crate::translate::translate;

/// Turns declarative routing resources into proxy configuration.
pub struct TranslatorRunner {
    provider: ProviderResources,
    translated: TranslatedConfig,
}

impl TranslatorRunner {
    pub fn new(provider: ProviderResources, translated: TranslatedConfig) -> Self {
        Self {
            provider,
            translated,
        }
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut sub = self.provider.routing.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("translator shutting down");
                    break;
                }
                event = sub.recv() => match event {
                    Some(_) => self.recompute(),
                    None => {
                        info!("resource store closed, translator stopping");
                        break;
                    }
                },
            }
        }
    }

    /// One full translation pass over the current resource set.
    fn recompute(&self) {
        // BTreeMap keeps the pass deterministic regardless of store
        // iteration order.
        let resources: BTreeMap<_, _> = self.provider.routing.load_all().into_iter().collect();
        let resource_count = resources.len();

        match translate(&resources) {
            Ok(translation) => {
                debug!(
                    resources = resource_count,
                    routes = translation.proxy.routes.len(),
                    clusters = translation.proxy.clusters.len(),
                    "translated routing resources"
                );
                self.translated.proxy.store(
                    TRANSLATED_CONFIG_KEY.to_string(),
                    Arc::new(translation.proxy),
                );

                // Publish fresh statuses and drop the ones whose
                // resources disappeared.
                for stale in self
                    .provider
                    .statuses
                    .load_all()
                    .into_keys()
                    .filter(|k| !translation.statuses.contains_key(k))
                {
                    self.provider.statuses.delete(&stale);
                }
                for (name, status) in translation.statuses {
                    if !status.is_accepted() {
                        error!(resource = %name, status = ?status, "resource rejected");
                    }
                    self.provider.statuses.store(name, status);
                }
            }
            Err(err) => {
                // Transient recomputation failure: log and keep serving
                // the previous output until the next notification.
                error!(%err, "translation failed, keeping previous proxy config");
            }
        }
    }
}

impl Runner for TranslatorRunner {
    fn name(&self) -> &'static str {
        "translator"
    }

    fn start(self: Box<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
