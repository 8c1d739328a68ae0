//! Declaration manifest watcher.
//!
//! File events arrive on notify's thread; they are forwarded to a Tokio task
//! that reloads the manifest and syncs it into the store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::manifest::{sync_manifest, Manifest};
use crate::store::MemoryStore;

/// Quiet period used to coalesce bursts of file events (editors often
/// write a file in several steps).
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Keeps the store in sync with a manifest file.
pub struct ManifestWatcher {
    path: PathBuf,
    store: MemoryStore,
}

impl ManifestWatcher {
    pub fn new(path: &Path, store: MemoryStore) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
        }
    }

    /// Load the manifest once and apply it. Errors leave the store untouched.
    pub async fn sync_once(&self) -> bool {
        match Manifest::load(&self.path) {
            Ok(manifest) => {
                sync_manifest(&self.store, &manifest).await;
                true
            }
            Err(e) => {
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Failed to load manifest. Keeping current declarations."
                );
                false
            }
        }
    }

    /// Start watching. The returned watcher must be kept alive for events to
    /// flow; the task exits when `shutdown` is cancelled.
    pub fn run(
        self,
        shutdown: CancellationToken,
    ) -> Result<(RecommendedWatcher, JoinHandle<()>), notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Manifest watcher started");

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                    }
                }

                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                tracing::info!("Manifest change detected, reloading...");
                self.sync_once().await;
            }
            tracing::debug!("Manifest watcher stopped");
        });

        Ok((watcher, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ObjectKey;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.toml", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_sync_once_applies_file() {
        let path = temp_path("manifest");
        std::fs::write(
            &path,
            r#"
[[declaration]]
name = "web"
healthcheckEndpoints = ["http://web.default.svc/healthz"]
"#,
        )
        .unwrap();

        let store = MemoryStore::new();
        let watcher = ManifestWatcher::new(&path, store.clone());
        assert!(watcher.sync_once().await);
        assert_eq!(store.len(), 1);
        assert!(crate::store::ObjectStore::get(&store, &ObjectKey::new("default", "web"))
            .await
            .is_ok());

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_sync_once_keeps_store_on_parse_error() {
        let path = temp_path("broken");
        std::fs::write(&path, "[[declaration]\nname = ").unwrap();

        let store = MemoryStore::new();
        store.apply(
            &ObjectKey::new("default", "kept"),
            crate::resource::DeclarationSpec::new(vec!["http://kept/healthz".into()]),
        );

        let watcher = ManifestWatcher::new(&path, store.clone());
        assert!(!watcher.sync_once().await);
        assert_eq!(store.len(), 1);

        std::fs::remove_file(&path).ok();
    }
}
