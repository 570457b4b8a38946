//! Extractor for `/etc/shadow`.

use async_trait::async_trait;

use super::{ExtractError, Extractor, ExtractorKind};
use crate::cloud_config::{Account, ConfigFragment};

/// Copies root's password hash onto both accounts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShadowExtractor;

impl ShadowExtractor {
    /// The second field of root's shadow line, if present and non-empty.
    ///
    /// A line with only `name:hash` and no further fields is not a shadow
    /// entry and is ignored.
    pub fn root_hash(contents: &str) -> Option<&str> {
        contents.lines().find_map(|line| {
            let mut fields = line.split(':');
            if fields.next()? != Account::Root.as_str() {
                return None;
            }
            let hash = fields.next().filter(|hash| !hash.is_empty())?;
            fields.next()?;
            Some(hash)
        })
    }
}

#[async_trait]
impl Extractor for ShadowExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Shadow
    }

    async fn extract(&self, contents: &str) -> Result<ConfigFragment, ExtractError> {
        let mut fragment = ConfigFragment::new();
        if let Some(hash) = Self::root_hash(contents) {
            fragment.set_password_hash(Account::Root, hash);
            fragment.set_password_hash(Account::Core, hash);
        }
        Ok(fragment)
    }
}
