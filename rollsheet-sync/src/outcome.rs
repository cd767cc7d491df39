//! Per-binding results of a fanned-out roster event.

use std::fmt;

use serde::{Deserialize, Serialize};

use rollsheet_core::SyncBinding;

use crate::error::SyncError;

/// What a successful binding operation did to its mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Inserted { row: u32 },
    Updated { row: u32 },
    Deleted { row: u32 },
    Rewritten { rows: usize },
    /// Add of a member that already has a row.
    AlreadyPresent { row: u32 },
    /// Remove of a member that has no row.
    NotPresent,
    /// Add of a member the binding's criteria do not let its owner see.
    NotVisible,
}

impl Change {
    /// `true` if the mirror was written to.
    pub fn mutated(&self) -> bool {
        matches!(
            self,
            Change::Inserted { .. }
                | Change::Updated { .. }
                | Change::Deleted { .. }
                | Change::Rewritten { .. }
        )
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Inserted { row } => write!(f, "inserted at row {row}"),
            Change::Updated { row } => write!(f, "updated row {row}"),
            Change::Deleted { row } => write!(f, "deleted row {row}"),
            Change::Rewritten { rows } => write!(f, "rewrote {rows} row(s)"),
            Change::AlreadyPresent { row } => write!(f, "already present at row {row}"),
            Change::NotPresent => write!(f, "not present"),
            Change::NotVisible => write!(f, "not visible to binding owner"),
        }
    }
}

/// Result of servicing one binding.
#[derive(Debug)]
pub enum Outcome {
    Applied(Change),
    /// The mirror was gone and the binding has been removed from the registry.
    Unlinked,
    Failed(SyncError),
}

impl Outcome {
    /// `Unlinked` counts as handled: it is reported, not raised.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied(_) => "applied",
            Outcome::Unlinked => "unlinked",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn change(&self) -> Option<&Change> {
        match self {
            Outcome::Applied(change) => Some(change),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied(change) => change.fmt(f),
            Outcome::Unlinked => write!(f, "mirror deleted; binding unlinked"),
            Outcome::Failed(err) => err.fmt(f),
        }
    }
}

/// One entry of a fan-out result.
#[derive(Debug)]
pub struct BindingReport {
    pub binding: SyncBinding,
    pub outcome: Outcome,
}
