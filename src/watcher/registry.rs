//! Registry mapping watched paths to their extractors.
//!
//! Keys are absolute paths as seen from inside the provisioned system
//! (`/etc/shadow`); the registry re-roots them under the watch root for
//! filesystem access and derives the parent directories to watch.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::extractors::{Extractor, ExtractorKind, Translator};

/// The fixed set of files the agent reacts to.
pub const WATCHED_PATHS: [(&str, ExtractorKind); 4] = [
    ("/etc/conf.d/net", ExtractorKind::Network),
    ("/root/.ssh/authorized_keys", ExtractorKind::SshKeys),
    ("/etc/shadow", ExtractorKind::Shadow),
    ("/etc/conf.d/hostname", ExtractorKind::Hostname),
];

/// One watched file.
pub struct WatchEntry {
    key: PathBuf,
    path: PathBuf,
    extractor: Arc<dyn Extractor>,
}

impl WatchEntry {
    /// Path rooted at `/`, e.g. `/etc/shadow`.
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Location of the file under the watch root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ExtractorKind {
        self.extractor.kind()
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }
}

impl fmt::Debug for WatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchEntry")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Immutable-after-construction lookup from paths to extractors.
#[derive(Debug)]
pub struct WatchRegistry {
    root: PathBuf,
    entries: Vec<WatchEntry>,
    watch_dirs: BTreeSet<PathBuf>,
}

impl WatchRegistry {
    /// Create an empty registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
            watch_dirs: BTreeSet::new(),
        }
    }

    /// Registry for [`WATCHED_PATHS`].
    pub fn standard(root: impl Into<PathBuf>, translator: Arc<dyn Translator>) -> Self {
        let mut registry = Self::new(root);
        for (key, kind) in WATCHED_PATHS {
            registry.register(key, kind.build(translator.clone()));
        }
        registry
    }

    /// Register an extractor for a `/`-rooted key.
    ///
    /// Returns the parent directory if it was not already being watched.
    /// Registering the same key again replaces its extractor.
    pub fn register(&mut self, key: impl AsRef<Path>, extractor: Arc<dyn Extractor>) -> Option<PathBuf> {
        let key = Path::new("/").join(key.as_ref());
        let path = self.root.join(key.strip_prefix("/").unwrap_or(&key));

        let new_dir = path
            .parent()
            .map(Path::to_path_buf)
            .filter(|dir| self.watch_dirs.insert(dir.clone()));

        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.extractor = extractor,
            None => self.entries.push(WatchEntry {
                key,
                path,
                extractor,
            }),
        }

        new_dir
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `/`-rooted key for a path under the watch root.
    pub fn key_for(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(Path::new("/").join(relative))
    }

    /// Find the entry responsible for a path under the watch root.
    pub fn resolve(&self, path: &Path) -> Option<&WatchEntry> {
        let key = self.key_for(path)?;
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &WatchEntry> {
        self.entries.iter()
    }

    /// Parent directories of all registered files.
    pub fn watch_dirs(&self) -> &BTreeSet<PathBuf> {
        &self.watch_dirs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
