//! Extractor for `/etc/conf.d/net`.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractError, Extractor, ExtractorKind, Translator};
use crate::cloud_config::{ConfigFragment, UnitDefinition};

static INTERFACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"eth\d+").expect("interface pattern is valid"));

/// Generates one `50-<iface>.network` unit per distinct interface.
///
/// The fragment is all-or-nothing: if any interface fails to translate,
/// units already produced in the same run are discarded.
pub struct NetworkExtractor {
    translator: Arc<dyn Translator>,
}

impl NetworkExtractor {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }

    /// Distinct interface names in order of first appearance.
    pub fn interfaces(contents: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        INTERFACE_PATTERN
            .find_iter(contents)
            .map(|m| m.as_str())
            .filter(|interface| seen.insert(*interface))
            .collect()
    }
}

#[async_trait]
impl Extractor for NetworkExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Network
    }

    async fn extract(&self, contents: &str) -> Result<ConfigFragment, ExtractError> {
        let mut fragment = ConfigFragment::new();

        for interface in Self::interfaces(contents) {
            let unit = self
                .translator
                .translate(interface, contents)
                .await
                .map_err(|source| ExtractError::Translate {
                    interface: interface.to_string(),
                    source,
                })?;
            crate::debug_event!("network", "translated", "{interface}");
            fragment.units.push(UnitDefinition::network(interface, unit));
        }

        Ok(fragment)
    }
}
