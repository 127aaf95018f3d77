//! Background thread keeping the cache coherent with the content root.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::thread::{self, JoinHandle};

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use crate::cache::FileCache;

/// Watches the cache root and rebuilds the cache after every batch of
/// create/modify/remove events.
///
/// The returned thread owns the watcher and runs until the watcher's event
/// channel closes.
pub fn spawn(cache: Arc<FileCache>) -> anyhow::Result<JoinHandle<()>> {
    let (tx, rx) = channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(tx).context("cannot create filesystem watcher")?;
    watcher
        .watch(cache.root(), RecursiveMode::Recursive)
        .with_context(|| format!("cannot watch {}", cache.root().display()))?;

    info!(root = %cache.root().display(), "Watching content root");

    thread::Builder::new()
        .name("cache-watch".into())
        .spawn(move || {
            let _watcher = watcher;
            watch_loop(&cache, rx);
        })
        .context("cannot spawn cache watch thread")
}

fn watch_loop(cache: &FileCache, rx: Receiver<notify::Result<Event>>) {
    while let Ok(first) = rx.recv() {
        // Fold everything already queued into a single rebuild.
        let changed = std::iter::once(first)
            .chain(rx.try_iter())
            .fold(false, |changed, event| changed | is_change(&event));

        if changed {
            if let Err(e) = cache.rebuild() {
                error!(error = %e, "Cache updating error");
            }
        }
    }
    debug!("Filesystem watcher closed");
}

fn is_change(event: &notify::Result<Event>) -> bool {
    match event {
        Ok(event) => {
            debug!(kind = ?event.kind, paths = ?event.paths, "Filesystem event");
            matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
            )
        }
        Err(e) => {
            error!(error = %e, "Filesystem watch error");
            false
        }
    }
}
