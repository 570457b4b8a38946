//! The dispatch loop.
//!
//! A [`Dispatcher`] owns the [`WatchRegistry`] and the [`ActivationGateway`]
//! and handles one event to completion before taking the next one, so two
//! activations never overlap. Each cycle reads one file, runs its extractor,
//! builds a fresh [`ConfigDocument`] and hands it to the gateway.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::Event;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::activation::{ActivationError, ActivationGateway};
use crate::cloud_config::ConfigDocument;
use crate::extractors::{ExtractError, ExtractorKind};

use super::error::WatchError;
use super::event::classify;
use super::registry::{WatchEntry, WatchRegistry};

/// Result of a cycle that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The path belongs to no extractor.
    Unregistered { path: PathBuf },
    /// The file was gone by the time it was read.
    Missing { key: PathBuf },
    /// A unit start was requested for the extracted configuration.
    Activated {
        key: PathBuf,
        unit: String,
        scratch: PathBuf,
    },
}

/// A failed cycle. The loop logs these and carries on.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{kind} extraction failed for {}: {source}", key.display())]
    Extract {
        kind: ExtractorKind,
        key: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("Activation failed for {}: {source}", key.display())]
    Activate {
        key: PathBuf,
        #[source]
        source: ActivationError,
    },
}

/// Counts from a reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Files that existed and were processed.
    pub attempted: usize,
    pub activated: usize,
    pub failed: usize,
}

/// Drives extraction and activation for watched files.
pub struct Dispatcher {
    registry: WatchRegistry,
    gateway: ActivationGateway,
    settle: Duration,
    react_to_modify: bool,
}

impl Dispatcher {
    pub fn new(registry: WatchRegistry, gateway: ActivationGateway) -> Self {
        Self {
            registry,
            gateway,
            settle: Duration::ZERO,
            react_to_modify: true,
        }
    }

    /// Pause between a triggering event and the read of the file.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Whether close-after-write events start a cycle.
    ///
    /// When enabled, creations wait for their close-write instead of
    /// starting a cycle of their own. See [`classify`].
    pub fn react_to_modify(mut self, enabled: bool) -> Self {
        self.react_to_modify = enabled;
        self
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Run every extractor whose file already exists, once, in registry order.
    pub async fn reconcile(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for entry in self.registry.entries() {
            if !entry.path().exists() {
                crate::debug_event!("reconcile", "absent", "{}", entry.key().display());
                continue;
            }

            summary.attempted += 1;
            match self.run_cycle(entry).await {
                Ok(CycleOutcome::Activated { .. }) => summary.activated += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("[reconcile] {e}");
                    summary.failed += 1;
                }
            }
        }

        crate::log_event!(
            "reconcile",
            "complete",
            "{} attempted, {} activated, {} failed",
            summary.attempted,
            summary.activated,
            summary.failed
        );
        summary
    }

    /// Handle one notification event.
    ///
    /// Returns one result per path of a triggering event, in event order;
    /// events that do not trigger return nothing. Unregistered paths are
    /// reported without waiting for the settle delay, which is applied at
    /// most once per event.
    pub async fn handle_event(&self, event: &Event) -> Vec<Result<CycleOutcome, CycleError>> {
        let Some(trigger) = classify(&event.kind, self.react_to_modify) else {
            crate::debug_event!("dispatch", "ignored", "{:?} {:?}", event.kind, event.paths);
            return Vec::new();
        };

        let resolved: Vec<_> = event
            .paths
            .iter()
            .map(|path| (path, self.registry.resolve(path)))
            .collect();

        let any_registered = resolved.iter().any(|(_, entry)| entry.is_some());
        if any_registered && !self.settle.is_zero() {
            sleep(self.settle).await;
        }

        let mut results = Vec::with_capacity(resolved.len());
        for (path, entry) in resolved {
            let Some(entry) = entry else {
                crate::debug_event!("dispatch", "no handler", "{}", path.display());
                results.push(Ok(CycleOutcome::Unregistered { path: path.clone() }));
                continue;
            };
            crate::debug_event!("dispatch", "triggered", "{trigger:?} {}", path.display());
            results.push(self.run_cycle(entry).await);
        }
        results
    }

    /// Resolve a path and run its cycle.
    pub async fn process_path(&self, path: &Path) -> Result<CycleOutcome, CycleError> {
        let Some(entry) = self.registry.resolve(path) else {
            crate::debug_event!("dispatch", "no handler", "{}", path.display());
            return Ok(CycleOutcome::Unregistered {
                path: path.to_path_buf(),
            });
        };
        self.run_cycle(entry).await
    }

    async fn run_cycle(&self, entry: &WatchEntry) -> Result<CycleOutcome, CycleError> {
        let key = entry.key().to_path_buf();

        let contents = match tokio::fs::read(entry.path()).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                crate::log_event!("dispatch", "vanished", "{}", key.display());
                return Ok(CycleOutcome::Missing { key });
            }
            Err(source) => {
                return Err(CycleError::Read {
                    path: entry.path().to_path_buf(),
                    source,
                });
            }
        };

        let kind = entry.kind();
        let fragment = entry
            .extractor()
            .extract(&contents)
            .await
            .map_err(|source| CycleError::Extract {
                kind,
                key: key.clone(),
                source,
            })?;

        if fragment.is_empty() {
            crate::debug_event!(kind.name(), "nothing extracted", "{}", key.display());
        }

        let document = ConfigDocument::from_fragment(fragment);
        let activation = self
            .gateway
            .activate(document)
            .await
            .map_err(|source| CycleError::Activate {
                key: key.clone(),
                source,
            })?;

        crate::log_event!(kind.name(), "activated", "{} -> {}", key.display(), activation.unit);
        Ok(CycleOutcome::Activated {
            key,
            unit: activation.unit,
            scratch: activation.scratch,
        })
    }

    /// Consume events until the source fails.
    ///
    /// Cycle failures are logged and never end the loop. A watcher error or
    /// a closed channel is fatal.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<notify::Result<Event>>,
    ) -> Result<(), WatchError> {
        crate::log_event!("watcher", "started");

        loop {
            let Some(received) = events.recv().await else {
                tracing::error!("[watcher] notification channel closed");
                return Err(WatchError::ChannelClosed);
            };

            let event = match received {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("[watcher] file watch error: {e}");
                    return Err(WatchError::EventSource {
                        details: e.to_string(),
                    });
                }
            };

            for result in self.handle_event(&event).await {
                if let Err(e) = result {
                    tracing::error!("[dispatch] {e}");
                }
            }
        }
    }
}
