//! Cloud-config document model.
//!
//! Extractors produce [`ConfigFragment`]s. A [`ConfigDocument`] accumulates
//! one or more fragments and renders them as a `#cloud-config` YAML document
//! that the provisioner consumes.
//!
//! # Accounts
//!
//! Only two accounts are ever configured: the privileged `root` account and
//! the default `core` account. The document's top-level `ssh_authorized_keys`
//! belong to the default account, so adding a key through
//! [`ConfigFragment::add_authorized_key`] also mirrors it onto `root`.

use serde::Serialize;
use thiserror::Error;

/// First line of every rendered document.
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Errors from rendering a document.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to serialize cloud-config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// The closed set of accounts a document can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Account {
    /// Privileged account.
    Root,
    /// Default non-privileged account.
    Core,
}

impl Account {
    pub fn as_str(&self) -> &'static str {
        match self {
            Account::Root => "root",
            Account::Core => "core",
        }
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user entry in the `users` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub name: Account,
    #[serde(rename = "passwd", skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(rename = "ssh-authorized-keys", skip_serializing_if = "Vec::is_empty")]
    pub authorized_keys: Vec<String>,
}

impl UserRecord {
    pub fn new(name: Account) -> Self {
        Self {
            name,
            password_hash: None,
            authorized_keys: Vec::new(),
        }
    }
}

/// A named unit with opaque textual content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDefinition {
    pub name: String,
    pub content: String,
}

impl UnitDefinition {
    /// Network unit for an interface, named `50-<interface>.network`.
    pub fn network(interface: &str, content: impl Into<String>) -> Self {
        Self {
            name: format!("50-{interface}.network"),
            content: content.into(),
        }
    }
}

/// Partial configuration produced by a single extractor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFragment {
    pub hostname: Option<String>,
    /// Keys for the default account.
    pub authorized_keys: Vec<String>,
    pub users: Vec<UserRecord>,
    pub units: Vec<UnitDefinition>,
}

impl ConfigFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the fragment carries nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.hostname.is_none()
            && self.authorized_keys.is_empty()
            && self.users.is_empty()
            && self.units.is_empty()
    }

    /// Add a key to the default account and mirror it onto `root`.
    pub fn add_authorized_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        user_entry(&mut self.users, Account::Root)
            .authorized_keys
            .push(key.clone());
        self.authorized_keys.push(key);
    }

    /// Set the password hash of one account.
    pub fn set_password_hash(&mut self, account: Account, hash: impl Into<String>) {
        user_entry(&mut self.users, account).password_hash = Some(hash.into());
    }

    /// Look up the record for an account, if present.
    pub fn user(&self, account: Account) -> Option<&UserRecord> {
        self.users.iter().find(|user| user.name == account)
    }
}

/// The `coreos` section of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoreosSection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<UnitDefinition>,
}

impl CoreosSection {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// The renderable configuration for one activation.
///
/// Field order is the rendered section order: hostname, keys and users,
/// then units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_authorized_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserRecord>,
    #[serde(skip_serializing_if = "CoreosSection::is_empty")]
    pub coreos: CoreosSection,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh document from a single fragment.
    pub fn from_fragment(fragment: ConfigFragment) -> Self {
        let mut document = Self::new();
        document.merge(fragment);
        document
    }

    /// Merge a fragment into this document.
    ///
    /// - a hostname in the fragment replaces the current one
    /// - keys are appended, skipping keys already present
    /// - users are merged by account: a password hash replaces the old one,
    ///   keys are appended without duplicates
    /// - units replace an existing unit of the same name, otherwise append
    pub fn merge(&mut self, fragment: ConfigFragment) {
        if let Some(hostname) = fragment.hostname {
            self.hostname = Some(hostname);
        }

        append_unique(&mut self.ssh_authorized_keys, fragment.authorized_keys);

        for record in fragment.users {
            let user = user_entry(&mut self.users, record.name);
            if let Some(hash) = record.password_hash {
                user.password_hash = Some(hash);
            }
            append_unique(&mut user.authorized_keys, record.authorized_keys);
        }

        for unit in fragment.units {
            match self.coreos.units.iter_mut().find(|u| u.name == unit.name) {
                Some(existing) => existing.content = unit.content,
                None => self.coreos.units.push(unit),
            }
        }
    }

    pub fn units(&self) -> &[UnitDefinition] {
        &self.coreos.units
    }

    pub fn user(&self, account: Account) -> Option<&UserRecord> {
        self.users.iter().find(|user| user.name == account)
    }

    /// Render as a `#cloud-config` YAML document.
    pub fn render(&self) -> Result<String, RenderError> {
        let body = serde_yaml::to_string(self)?;
        Ok(format!("{CLOUD_CONFIG_HEADER}\n{body}"))
    }
}

fn user_entry(users: &mut Vec<UserRecord>, account: Account) -> &mut UserRecord {
    let index = match users.iter().position(|user| user.name == account) {
        Some(index) => index,
        None => {
            users.push(UserRecord::new(account));
            users.len() - 1
        }
    };
    &mut users[index]
}

fn append_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
