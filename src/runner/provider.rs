//! Filesystem resource provider.
//!
//! # Responsibilities
//! - Load every routing resource file from the resource directory
//! - Watch the directory and mirror file changes into the routing store
//! - Delete a resource's entry when its file is removed
//!
//! # Design Decisions
//! - File stem is the resource key; one file, one resource
//! - A file that fails to parse is logged and skipped, the store keeps
//!   the last good version of that resource
//! - notify events are bridged onto a tokio channel so the runner loop
//!   can select against shutdown

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::message::ProviderResources;
use crate::resources::RoutingResource;
use crate::runner::Runner;

/// Resource file loading failures.
#[derive(Debug, Error)]
pub enum ResourceFileError {
    #[error("read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported extension on {0:?}")]
    UnsupportedExtension(PathBuf),
}

/// Watches a directory of declarative routing resources and writes
/// them into the provider store.
pub struct ProviderRunner {
    resource_dir: PathBuf,
    resources: ProviderResources,
}

impl ProviderRunner {
    pub fn new(resource_dir: PathBuf, resources: ProviderResources) -> Self {
        Self {
            resource_dir,
            resources,
        }
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        self.initial_scan();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = match spawn_watcher(&self.resource_dir, tx) {
            Ok(watcher) => watcher,
            Err(err) => {
                // Without a watcher the initial scan still stands; the
                // runner idles until shutdown instead of crashing the
                // pipeline.
                error!(dir = ?self.resource_dir, %err, "failed to start resource watcher");
                let _ = shutdown.recv().await;
                return;
            }
        };
        info!(dir = ?self.resource_dir, "resource provider watching");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("resource provider shutting down");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
    }

    /// Load everything already on disk before watching for changes.
    fn initial_scan(&self) {
        let entries = match std::fs::read_dir(&self.resource_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = ?self.resource_dir, %err, "cannot read resource directory");
                return;
            }
        };

        let mut loaded = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if resource_key(&path).is_none() {
                continue;
            }
            if self.load_into_store(&path) {
                loaded += 1;
            }
        }
        info!(dir = ?self.resource_dir, loaded, "initial resource scan complete");
    }

    fn handle_event(&self, event: Event) {
        for path in &event.paths {
            let Some(key) = resource_key(path) else {
                continue;
            };
            if event.kind.is_remove() {
                info!(resource = %key, "resource file removed");
                self.resources.routing.delete(&key);
                self.resources.statuses.delete(&key);
            } else if event.kind.is_create() || event.kind.is_modify() {
                debug!(resource = %key, "resource file changed");
                self.load_into_store(path);
            }
        }
    }

    /// Returns true when the file parsed and was stored.
    fn load_into_store(&self, path: &Path) -> bool {
        match load_resource_file(path) {
            Ok(resource) => {
                let Some(key) = resource_key(path) else {
                    return false;
                };
                self.resources.routing.store(key, Arc::new(resource));
                true
            }
            Err(err) => {
                // Keep the last good version of this resource.
                error!(%err, "failed to load resource file");
                false
            }
        }
    }
}

impl Runner for ProviderRunner {
    fn name(&self) -> &'static str {
        "provider"
    }

    fn start(self: Box<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// The store key for a resource file: its stem, provided the extension
/// is one we parse.
fn resource_key(path: &Path) -> Option<String> {
    let ext = path.extension().and_then(|e| e.to_str())?;
    if !matches!(ext, "toml" | "json") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Parse one resource file by extension.
pub fn load_resource_file(path: &Path) -> Result<RoutingResource, ResourceFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ResourceFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| ResourceFileError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        Some("json") => serde_json::from_str(&content).map_err(|e| ResourceFileError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        _ => Err(ResourceFileError::UnsupportedExtension(path.to_path_buf())),
    }
}

/// Start a notify watcher whose events land on a tokio channel.
fn spawn_watcher(
    dir: &Path,
    tx: mpsc::UnboundedSender<Event>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => error!(%err, "resource watch error"),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
