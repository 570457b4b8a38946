//! Activation of rendered documents through the service manager.
//!
//! The gateway renders a [`ConfigDocument`], persists it to a uniquely named
//! scratch file and asks the [`ServiceManager`] to run the provisioner
//! against that file as a transient unit. Activation is fire-and-forget:
//! the gateway does not wait for the unit to finish.

mod systemd;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cloud_config::{ConfigDocument, RenderError};
use crate::config::ActivationConfig;

pub use systemd::{DryRun, SystemdRun};

/// Errors from activating a document.
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Failed to write scratch file in {}: {source}", dir.display())]
    Persist {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Scratch file {} has no usable name", path.display())]
    ScratchName { path: PathBuf },

    #[error("Cannot reach service manager via {}: {source}", program.display())]
    Connect {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Service manager refused unit '{unit}' ({status}): {stderr}")]
    StartFailed {
        unit: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// A transient unit start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientUnit {
    pub name: String,
    pub description: String,
    /// Program followed by its arguments.
    pub exec_start: Vec<String>,
}

/// Starts transient units on the host's service manager.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Request the unit start. Returns once the request is accepted.
    async fn start_transient_unit(&self, unit: &TransientUnit) -> Result<(), ActivationError>;
}

/// Result of a successful activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub unit: String,
    pub scratch: PathBuf,
}

/// Persists documents and requests their transient-unit activation.
pub struct ActivationGateway {
    manager: Arc<dyn ServiceManager>,
    provisioner: PathBuf,
    description: String,
    scratch_dir: PathBuf,
    scratch_prefix: String,
}

impl ActivationGateway {
    /// Create a gateway from the `[activation]` settings.
    pub fn new(manager: Arc<dyn ServiceManager>, config: &ActivationConfig) -> Self {
        Self {
            manager,
            provisioner: config.provisioner.clone(),
            description: config.description.clone(),
            scratch_dir: config.scratch_dir(),
            scratch_prefix: config.scratch_prefix.clone(),
        }
    }

    /// Render, persist and request activation of a document.
    ///
    /// The document is consumed; nothing retains it after this call.
    pub async fn activate(&self, document: ConfigDocument) -> Result<Activation, ActivationError> {
        let rendered = document.render()?;
        let scratch = self.persist(&rendered)?;
        crate::debug_event!("activation", "wrote", "{}", scratch.display());

        let unit = self.transient_unit(&scratch)?;
        crate::log_event!("activation", "starting unit", "{}", unit.name);
        self.manager.start_transient_unit(&unit).await?;

        Ok(Activation {
            unit: unit.name,
            scratch,
        })
    }

    /// Write the rendered document to a new scratch file and keep it on disk.
    fn persist(&self, rendered: &str) -> Result<PathBuf, ActivationError> {
        let persist_err = |source| ActivationError::Persist {
            dir: self.scratch_dir.clone(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix(&self.scratch_prefix)
            .tempfile_in(&self.scratch_dir)
            .map_err(persist_err)?;
        file.write_all(rendered.as_bytes()).map_err(persist_err)?;
        file.flush().map_err(persist_err)?;

        let (_, path) = file.keep().map_err(|e| persist_err(e.error))?;
        Ok(path)
    }

    /// Unit named after the scratch file that runs the provisioner on it.
    pub fn transient_unit(&self, scratch: &Path) -> Result<TransientUnit, ActivationError> {
        let base = scratch
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ActivationError::ScratchName {
                path: scratch.to_path_buf(),
            })?;

        Ok(TransientUnit {
            name: format!("{base}.service"),
            description: self.description.clone(),
            exec_start: vec![
                self.provisioner.display().to_string(),
                "--from-file".to_string(),
                scratch.display().to_string(),
            ],
        })
    }
}
