//! Configuration Directory Watcher
//!
//! Polls the configuration directory for changes to `*.json` files and
//! triggers a reload once the directory has been quiet for the debounce
//! window. Reload failures keep the previous snapshot active; the watcher
//! keeps running either way.

use crate::formats::ConfigurationStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Debounce window: a burst of file writes produces one reload.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

type Fingerprint = HashMap<PathBuf, (SystemTime, u64)>;

fn scan(dir: &Path) -> Fingerprint {
    let mut fingerprint = Fingerprint::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return fingerprint;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            fingerprint.insert(path, (mtime, meta.len()));
        }
    }
    fingerprint
}

/// Spawn the watcher task. It runs until the token is cancelled.
pub fn spawn_watcher(
    store: Arc<ConfigurationStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current = scan(store.dir());
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(DEBOUNCE) => {}
            }

            let next = scan(store.dir());
            if next == current {
                continue;
            }
            debug!(dir = %store.dir().display(), "configuration change detected, debouncing");

            // Wait until the directory has been stable for a full window.
            let mut last = next;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(DEBOUNCE) => {}
                }
                let probe = scan(store.dir());
                if probe == last {
                    break;
                }
                last = probe;
            }

            current = last;
            if let Err(e) = store.reload() {
                warn!(error = %e, "hot reload failed");
            }
        }
    })
}
