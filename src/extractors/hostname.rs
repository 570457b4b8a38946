//! Extractor for `/etc/conf.d/hostname`.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractError, Extractor, ExtractorKind};
use crate::cloud_config::ConfigFragment;

// HOSTNAME="node-7"
static HOSTNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"HOSTNAME="([^"\n]+)""#).expect("hostname pattern is valid"));

/// Reads the quoted `HOSTNAME=` assignment.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostnameExtractor;

impl HostnameExtractor {
    pub fn hostname(contents: &str) -> Option<&str> {
        HOSTNAME_PATTERN
            .captures(contents)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str())
    }
}

#[async_trait]
impl Extractor for HostnameExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Hostname
    }

    async fn extract(&self, contents: &str) -> Result<ConfigFragment, ExtractError> {
        Ok(ConfigFragment {
            hostname: Self::hostname(contents).map(str::to_string),
            ..ConfigFragment::default()
        })
    }
}
