//! Field extractors for the watched provisioning files.
//!
//! Each watched file has one extractor that parses its raw contents into a
//! [`ConfigFragment`]. Extractors only read the contents they are given; the
//! network extractor is the one exception with side effects, since it runs
//! the external [`Translator`] once per interface.
//!
//! ```text
//! /etc/conf.d/net             -> NetworkExtractor  (units)
//! /root/.ssh/authorized_keys  -> SshKeysExtractor  (keys, mirrored to root)
//! /etc/shadow                 -> ShadowExtractor   (password hashes)
//! /etc/conf.d/hostname        -> HostnameExtractor (hostname)
//! ```

mod hostname;
mod network;
mod shadow;
mod ssh_keys;
mod translator;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cloud_config::ConfigFragment;

pub use hostname::HostnameExtractor;
pub use network::NetworkExtractor;
pub use shadow::ShadowExtractor;
pub use ssh_keys::SshKeysExtractor;
pub use translator::{ScriptTranslator, TranslateError, Translator};

/// Errors from running an extractor.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Translator failed for interface {interface}: {source}")]
    Translate {
        interface: String,
        #[source]
        source: TranslateError,
    },
}

/// The known file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    Network,
    SshKeys,
    Shadow,
    Hostname,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 4] = [
        ExtractorKind::Network,
        ExtractorKind::SshKeys,
        ExtractorKind::Shadow,
        ExtractorKind::Hostname,
    ];

    /// Short name used as the log component.
    pub fn name(&self) -> &'static str {
        match self {
            ExtractorKind::Network => "network",
            ExtractorKind::SshKeys => "ssh-keys",
            ExtractorKind::Shadow => "shadow",
            ExtractorKind::Hostname => "hostname",
        }
    }

    /// Instantiate the extractor for this kind.
    ///
    /// Only [`ExtractorKind::Network`] uses the translator.
    pub fn build(self, translator: Arc<dyn Translator>) -> Arc<dyn Extractor> {
        match self {
            ExtractorKind::Network => Arc::new(NetworkExtractor::new(translator)),
            ExtractorKind::SshKeys => Arc::new(SshKeysExtractor),
            ExtractorKind::Shadow => Arc::new(ShadowExtractor),
            ExtractorKind::Hostname => Arc::new(HostnameExtractor),
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses one known file format into a configuration fragment.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Which file format this extractor understands.
    fn kind(&self) -> ExtractorKind;

    /// Extract a fragment from the file's raw contents.
    ///
    /// Content without the expected fields yields an empty fragment, not
    /// an error.
    async fn extract(&self, contents: &str) -> Result<ConfigFragment, ExtractError>;
}
