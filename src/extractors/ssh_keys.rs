//! Extractor for `/root/.ssh/authorized_keys`.

use async_trait::async_trait;

use super::{ExtractError, Extractor, ExtractorKind};
use crate::cloud_config::ConfigFragment;

/// Prefix shared by the SSH public key types we accept.
const KEY_PREFIX: &str = "ssh-";

/// Collects every key line and mirrors it onto both accounts.
///
/// A key line carries an `ssh-*` key type, either first or after an
/// options field (`no-pty,from="10.0.0.0/8" ssh-rsa AAA...`). Lines are
/// kept whole so the options still apply. Comment lines are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshKeysExtractor;

impl SshKeysExtractor {
    /// Keys in input order, surrounding whitespace trimmed.
    ///
    /// An unterminated final line is included.
    pub fn keys(contents: &str) -> impl Iterator<Item = &str> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .filter(|line| line.split_whitespace().any(is_key_type))
    }
}

fn is_key_type(field: &str) -> bool {
    field.len() > KEY_PREFIX.len() && field.starts_with(KEY_PREFIX)
}

#[async_trait]
impl Extractor for SshKeysExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::SshKeys
    }

    async fn extract(&self, contents: &str) -> Result<ConfigFragment, ExtractError> {
        let mut fragment = ConfigFragment::new();
        for key in Self::keys(contents) {
            fragment.add_authorized_key(key);
        }
        Ok(fragment)
    }
}
