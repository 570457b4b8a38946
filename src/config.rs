//! Layered configuration for the agent.
//!
//! Settings are resolved from, in increasing precedence:
//! - built-in defaults
//! - an optional TOML file (`--config <PATH>`)
//! - environment variables prefixed with `PW_`
//! - command-line flags
//!
//! # Environment Variables
//!
//! Nested keys are separated by a double underscore:
//! - `PW_WATCH_DIR=/mnt/xenstore` sets `watch_dir`
//! - `PW_WATCH__SETTLE_MS=250` sets `watch.settle_ms`
//! - `PW_ACTIVATION__PROVISIONER=/opt/bin/coreos-cloudinit` sets `activation.provisioner`
//!
//! # Example
//!
//! ```toml
//! watch_dir = "/"
//! scripts_dir = "/usr/share/provision-watcher/scripts"
//!
//! [watch]
//! settle_ms = 100
//! react_to_modify = true
//!
//! [activation]
//! provisioner = "/usr/bin/coreos-cloudinit"
//!
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! provision_watcher = "debug"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PW_";

/// Errors from loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory treated as `/` when resolving watched paths
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Directory holding the supporting shell scripts
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub activation: ActivationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Pause after an event before reading the file, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Re-run extraction when a watched file is rewritten, not only created
    #[serde(default = "default_true")]
    pub react_to_modify: bool,

    /// Capacity of the notification queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Translator script name, resolved under `scripts_dir`
    #[serde(default = "default_translator")]
    pub translator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Provisioner run by each transient unit
    #[serde(default = "default_provisioner")]
    pub provisioner: PathBuf,

    /// Description attached to transient units
    #[serde(default = "default_description")]
    pub description: String,

    /// Where rendered documents are written (system temp dir when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// File name prefix for rendered documents
    #[serde(default = "default_scratch_prefix")]
    pub scratch_prefix: String,

    /// `systemd-run` binary used to start transient units
    #[serde(default = "default_systemd_run")]
    pub systemd_run: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `provision_watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_scripts_dir() -> PathBuf {
    PathBuf::from("./scripts")
}
fn default_settle_ms() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_channel_capacity() -> usize {
    100
}
fn default_translator() -> String {
    "gentoo-to-networkd".to_string()
}
fn default_provisioner() -> PathBuf {
    PathBuf::from("/usr/bin/coreos-cloudinit")
}
fn default_description() -> String {
    "Unit generated and executed by coreos-cloudinit on behalf of user".to_string()
}
fn default_scratch_prefix() -> String {
    "rackspace-cloudinit-".to_string()
}
fn default_systemd_run() -> PathBuf {
    PathBuf::from("systemd-run")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            scripts_dir: default_scripts_dir(),
            watch: WatchConfig::default(),
            network: NetworkConfig::default(),
            activation: ActivationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            react_to_modify: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            translator: default_translator(),
        }
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            provisioner: default_provisioner(),
            description: default_description(),
            scratch_dir: None,
            scratch_prefix: default_scratch_prefix(),
            systemd_run: default_systemd_run(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl ActivationConfig {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment.
    ///
    /// An explicitly requested file that does not exist is an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    /// Apply command-line overrides on top of the loaded settings.
    pub fn apply_overrides(&mut self, watch_dir: Option<PathBuf>, scripts_dir: Option<PathBuf>) {
        if let Some(dir) = watch_dir {
            self.watch_dir = dir;
        }
        if let Some(dir) = scripts_dir {
            self.scripts_dir = dir;
        }
    }

    /// Absolute form of `watch_dir`, so event paths can be compared to it.
    ///
    /// The directory does not have to exist.
    pub fn resolved_watch_dir(&self) -> std::io::Result<PathBuf> {
        std::path::absolute(&self.watch_dir)
    }

    /// Full path of the network translator script.
    pub fn translator_path(&self) -> PathBuf {
        self.scripts_dir.join(&self.network.translator)
    }

    /// Effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
