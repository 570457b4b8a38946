//! The filesystem notification source.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::WatchError;
use super::registry::WatchRegistry;

/// A `notify` watcher feeding a bounded channel.
///
/// Events and watcher errors travel on the same channel, so the consumer
/// sees them in the order the backend reported them.
pub struct EventSource {
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
}

impl EventSource {
    pub fn new(capacity: usize) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        // Runs on notify's backend thread; blocking applies back-pressure
        // while the dispatcher is busy with a cycle.
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok(Self {
            watcher,
            events: rx,
        })
    }

    /// Watch the parent directory of every registered file.
    ///
    /// A directory that cannot be watched (usually because it does not
    /// exist yet) is logged and skipped. Returns the number of directories
    /// watched.
    pub fn watch_registry(&mut self, registry: &WatchRegistry) -> usize {
        let mut watched = 0;
        for dir in registry.watch_dirs() {
            match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    crate::debug_event!("watcher", "watching", "{}", dir.display());
                    watched += 1;
                }
                Err(e) => {
                    let err = WatchError::PathWatchFailed {
                        path: dir.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("[watcher] {err} (directory doesn't exist?)");
                }
            }
        }
        watched
    }

    /// Split into the watcher, which must stay alive, and the event stream.
    pub fn into_parts(self) -> (RecommendedWatcher, mpsc::Receiver<notify::Result<Event>>) {
        (self.watcher, self.events)
    }
}
