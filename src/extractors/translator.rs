//! External translator for legacy network interface syntax.
//!
//! The translator is a script that receives the interface name as its only
//! argument and the raw `conf.d/net` contents on stdin, and prints a
//! systemd-networkd unit on stdout.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::string::FromUtf8Error;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors from a translator invocation.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Cannot start translator {}: {source}", script.display())]
    Spawn {
        script: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error talking to translator: {0}")]
    Io(#[source] io::Error),

    #[error("Translator {status}: {stderr}")]
    NonZeroExit { status: ExitStatus, stderr: String },

    #[error("Translator output is not UTF-8: {0}")]
    InvalidOutput(#[source] FromUtf8Error),
}

/// Converts one interface's legacy configuration into unit content.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, interface: &str, contents: &str) -> Result<String, TranslateError>;
}

/// Runs the translator script as a subprocess.
#[derive(Debug, Clone)]
pub struct ScriptTranslator {
    script: PathBuf,
}

impl ScriptTranslator {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

#[async_trait]
impl Translator for ScriptTranslator {
    async fn translate(&self, interface: &str, contents: &str) -> Result<String, TranslateError> {
        crate::debug_event!("translator", "running", "{} {interface}", self.script.display());

        let mut child = Command::new(&self.script)
            .arg(interface)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranslateError::Spawn {
                script: self.script.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TranslateError::Io(io::Error::other("translator stdin not captured")))?;

        // Feed stdin concurrently so a script that writes before it finishes
        // reading cannot block on a full stdout pipe.
        let input = contents.to_owned();
        let writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await.map_err(TranslateError::Io)?;

        match writer.await {
            Ok(Ok(())) => {}
            // The script is free to ignore its input.
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(TranslateError::Io(e)),
            Err(e) => return Err(TranslateError::Io(io::Error::other(e))),
        }

        if !output.status.success() {
            return Err(TranslateError::NonZeroExit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(TranslateError::InvalidOutput)
    }
}
