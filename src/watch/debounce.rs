use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Write-completion detection: each observed path gets a one-shot timer
/// of the debounce window, and every new event for that path resets it.
/// A path is dispatched only when its timer fires with no intervening
/// event, i.e. the writer has been quiet for a full window.
pub struct Debouncer {
    window: Duration,
    timers: Arc<Mutex<HashMap<PathBuf, JoinHandle<()>>>>,
    due_tx: mpsc::UnboundedSender<PathBuf>,
}

impl Debouncer {
    /// Create a debouncer and the channel on which quiesced paths arrive.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                timers: Arc::new(Mutex::new(HashMap::new())),
                due_tx,
            },
            due_rx,
        )
    }

    /// Record an event for `path`, resetting its timer.
    pub fn touch(&self, path: PathBuf) {
        let mut timers = self.timers.lock().unwrap();

        if let Some(previous) = timers.remove(&path) {
            previous.abort();
            trace!(path = %path.display(), "debounce timer reset");
        }

        let window = self.window;
        let registry = Arc::clone(&self.timers);
        let due_tx = self.due_tx.clone();
        let key = path.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            registry.lock().unwrap().remove(&key);
            let _ = due_tx.send(key);
        });
        timers.insert(path, handle);
    }

    /// Number of paths still waiting out their window.
    pub fn pending(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Cancel every pending timer. No further dispatches occur.
    pub fn stop(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}
