use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Recursive directory observation built from per-directory subscriptions.
///
/// Each directory is watched non-recursively; the initial tree walk
/// subscribes every existing directory and the orchestrator subscribes
/// newly created ones as their create events arrive. Raw notify events
/// are forwarded from the backend thread into an async channel.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
}

impl DirectoryWatcher {
    pub fn new() -> notify::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let _ = tx.send(result);
        })?;
        Ok(Self { watcher, events })
    }

    /// Subscribe one directory (non-recursive).
    pub fn subscribe(&mut self, dir: &Path) -> notify::Result<()> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)
    }

    /// Subscribe `root` and every directory below it. Returns how many
    /// directories are now watched from this call.
    pub fn subscribe_tree(&mut self, root: &Path) -> notify::Result<usize> {
        let mut count = 0;
        for entry in walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
        {
            self.subscribe(entry.path())?;
            count += 1;
            debug!(dir = %entry.path().display(), "subscribed");
        }
        Ok(count)
    }

    /// Next filesystem event; `None` once the watcher is gone. Backend
    /// errors are logged and skipped.
    pub async fn next(&mut self) -> Option<notify::Event> {
        loop {
            match self.events.recv().await? {
                Ok(event) => return Some(event),
                Err(error) => warn!(%error, "filesystem watcher error"),
            }
        }
    }
}
