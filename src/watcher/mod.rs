//! Event-driven dispatch of watched provisioning files.
//!
//! # Architecture
//!
//! ```text
//! notify::RecommendedWatcher (parent dirs of watched files)
//!         |
//!    EventSource  -- bounded channel of notify::Result<Event>
//!         |
//!    Dispatcher   -- one event at a time, in arrival order
//!         |
//!   WatchRegistry::resolve -> Extractor -> ConfigDocument -> ActivationGateway
//! ```
//!
//! The dispatcher runs a reconciliation sweep over files that already exist
//! before consuming live events. Per-cycle failures are logged and the loop
//! returns to idle; only a broken notification source ends it.

mod dispatch;
mod error;
mod event;
mod registry;
mod source;

pub use dispatch::{CycleError, CycleOutcome, Dispatcher, ReconcileSummary};
pub use error::WatchError;
pub use event::{Trigger, classify};
pub use registry::{WATCHED_PATHS, WatchEntry, WatchRegistry};
pub use source::EventSource;
