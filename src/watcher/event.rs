//! Classification of notification events.
//!
//! A plain write of a file produces a create event followed by a close-write
//! event for the same path. Only one of them may start a cycle, otherwise a
//! single write would activate twice:
//!
//! - with `react_to_modify` on, the close-write is the trigger for both new
//!   and rewritten files and the create is ignored
//! - with `react_to_modify` off, the create is the trigger and close-write is
//!   ignored, so rewrites of existing files do nothing
//!
//! A rename onto a watched path always triggers, since provisioning tools
//! commonly write a temp file and move it into place and no close-write
//! follows the rename. Metadata changes, raw data writes, reads and removals
//! never trigger.

use notify::EventKind;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};

/// Why an event should start a dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Created,
    MovedIn,
    Written,
}

/// Decide whether an event kind starts a cycle.
pub fn classify(kind: &EventKind, react_to_modify: bool) -> Option<Trigger> {
    match kind {
        EventKind::Create(_) if !react_to_modify => Some(Trigger::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            Some(Trigger::MovedIn)
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) if react_to_modify => {
            Some(Trigger::Written)
        }
        _ => None,
    }
}
