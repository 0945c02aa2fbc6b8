//! Filesystem watcher: debounced change events feeding the processor.
//!
//! Events are debounced at the OS-notification layer, collapsed per path,
//! filtered to supported extensions, and pushed onto a bounded queue. The
//! queue is the backpressure boundary: when it is full, further events are
//! rejected with a warning instead of buffering without limit — the next
//! full `sync` reconciles anything dropped.
//!
//! Created and modified events are treated identically; the processor's
//! fingerprint check decides whether work actually happens.

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::rag::RagEngine;
use crate::reader;

/// A change the processor should act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File created or modified: process with fingerprint check.
    Upsert(PathBuf),
    /// File removed: drop its records.
    Remove(PathBuf),
}

pub struct WatchService {
    // Held for its Drop: dropping stops the underlying watcher.
    _debouncer: notify_debouncer_full::Debouncer<
        notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
    worker: tokio::task::JoinHandle<()>,
}

impl WatchService {
    /// Watch the engine's documents directory and feed changes through.
    pub fn start(engine: Arc<RagEngine>) -> Result<Self> {
        let config = engine.config();
        let root = config.documents_dir.clone();
        let debounce = Duration::from_millis(config.watcher_debounce_ms);
        let (tx, rx) = mpsc::channel::<WatchEvent>(config.watcher_max_queue);

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in classify_events(&events) {
                        if let Err(mpsc::error::TrySendError::Full(dropped)) = tx.try_send(event) {
                            warn!("watcher queue full, dropping {dropped:?}");
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!("watcher error: {e:?}");
                    }
                }
            }
        })
        .map_err(|e| RagError::Initialization(format!("cannot create watcher: {e}")))?;

        debouncer
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| RagError::Initialization(format!("cannot watch {}: {e}", root.display())))?;

        let worker = tokio::spawn(drain_events(engine, rx));

        info!(
            "watching {} (debounce {}ms)",
            root.display(),
            debounce.as_millis()
        );
        Ok(Self {
            _debouncer: debouncer,
            worker,
        })
    }

    pub async fn stop(self) {
        self.worker.abort();
        let _ = self.worker.await;
    }
}

async fn drain_events(engine: Arc<RagEngine>, mut rx: mpsc::Receiver<WatchEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            WatchEvent::Upsert(path) => {
                if let Err(e) = engine.process_path(&path, false).await {
                    warn!("watcher: failed to process {}: {e}", path.display());
                }
            }
            WatchEvent::Remove(path) => {
                if let Err(e) = engine.remove_document(&path).await {
                    warn!("watcher: failed to remove {}: {e}", path.display());
                }
            }
        }
    }
    debug!("watcher event loop finished");
}

/// Collapse a debounced event batch into one action per path.
///
/// Later events win: a create followed by a remove within one batch nets
/// out to a removal. Unsupported paths are skipped up front.
fn classify_events(events: &[DebouncedEvent]) -> Vec<WatchEvent> {
    use notify::EventKind;
    let mut per_path: Vec<(PathBuf, bool)> = Vec::new();

    for event in events {
        let removed = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => false,
            EventKind::Remove(_) => true,
            _ => continue,
        };
        for path in &event.paths {
            if !reader::is_supported(path) {
                continue;
            }
            if let Some(entry) = per_path.iter_mut().find(|(p, _)| p == path) {
                entry.1 = removed;
            } else {
                per_path.push((path.clone(), removed));
            }
        }
    }

    per_path
        .into_iter()
        .map(|(path, removed)| {
            if removed {
                WatchEvent::Remove(path)
            } else {
                WatchEvent::Upsert(path)
            }
        })
        .collect()
}
