//! Node-local agent that turns provisioned configuration files into
//! cloud-config activations.
//!
//! A provisioning mechanism drops a handful of files into the node
//! (`/etc/conf.d/net`, `/root/.ssh/authorized_keys`, `/etc/shadow`,
//! `/etc/conf.d/hostname`). The agent watches them, extracts the relevant
//! fields, renders a `#cloud-config` document and asks systemd to run the
//! provisioner against it in a transient unit.

pub mod activation;
pub mod cli;
pub mod cloud_config;
pub mod config;
pub mod extractors;
pub mod logging;
pub mod watcher;

pub use activation::{Activation, ActivationError, ActivationGateway, ServiceManager, TransientUnit};
pub use cloud_config::{Account, ConfigDocument, ConfigFragment, UnitDefinition, UserRecord};
pub use config::Settings;
pub use extractors::{Extractor, ExtractorKind, Translator};
pub use watcher::{CycleError, CycleOutcome, Dispatcher, EventSource, WatchError, WatchRegistry};
