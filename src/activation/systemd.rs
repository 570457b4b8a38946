//! Service manager implementations.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ActivationError, ServiceManager, TransientUnit};

/// Starts transient units with `systemd-run`.
///
/// `--no-block` makes systemd queue the start job and return immediately,
/// so the caller never waits on the provisioner itself.
#[derive(Debug, Clone)]
pub struct SystemdRun {
    program: PathBuf,
}

impl SystemdRun {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to `systemd-run` for a unit.
    pub fn args(unit: &TransientUnit) -> Vec<String> {
        let mut args = vec![
            "--no-block".to_string(),
            format!("--unit={}", unit.name),
            format!("--description={}", unit.description),
            "--".to_string(),
        ];
        args.extend(unit.exec_start.iter().cloned());
        args
    }
}

impl Default for SystemdRun {
    fn default() -> Self {
        Self::new("systemd-run")
    }
}

#[async_trait]
impl ServiceManager for SystemdRun {
    async fn start_transient_unit(&self, unit: &TransientUnit) -> Result<(), ActivationError> {
        let output = Command::new(&self.program)
            .args(Self::args(unit))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ActivationError::Connect {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ActivationError::StartFailed {
                unit: unit.name.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Logs the unit instead of starting it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRun;

#[async_trait]
impl ServiceManager for DryRun {
    async fn start_transient_unit(&self, unit: &TransientUnit) -> Result<(), ActivationError> {
        crate::log_event!(
            "dry-run",
            "would start",
            "{} ({})",
            unit.name,
            unit.exec_start.join(" ")
        );
        Ok(())
    }
}
