//! Error types for rollsheet-sync.

use thiserror::Error;

use rollsheet_core::{BindingId, ListId, MemberId, MirrorId, RegistryError};

use crate::collab::{RosterError, TabularError};

/// Closed set of per-binding failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mirror is gone. The orchestrator unlinks the binding when it sees this.
    #[error("mirror {mirror} no longer exists")]
    NotFoundExternal { mirror: MirrorId },

    /// The binding's visibility criteria are empty; nothing was mutated.
    #[error("binding {binding} has no usable visibility criteria")]
    AuthorizationDenied { binding: BindingId },

    /// The identity column contradicts the mirror layout (no header, duplicate
    /// ids). Distinct from [`SyncError::NotFoundExternal`]: the binding stays.
    #[error("mirror {mirror} is corrupt: {reason}")]
    CorruptMirrorState { mirror: MirrorId, reason: String },

    /// Update targeting a member the mirror does not contain.
    #[error("member {member} has no row in mirror {mirror}")]
    RowNotFound { mirror: MirrorId, member: MemberId },

    #[error("list {list} is already bound to mirror {mirror}")]
    DuplicateBinding { list: ListId, mirror: MirrorId },

    /// A row number outside the index it was computed from.
    #[error("data row {row} is outside 1..={limit}")]
    InvalidRow { row: u32, limit: u32 },

    #[error("no binding {binding} on this list")]
    UnknownBinding { binding: BindingId },

    /// Any other spreadsheet API failure.
    #[error("mirror {mirror}: {source}")]
    External {
        mirror: MirrorId,
        #[source]
        source: TabularError,
    },

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("registry error: {0}")]
    Registry(RegistryError),

    /// A blocking registry task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Background(String),
}

impl SyncError {
    /// Map a spreadsheet API failure on `mirror` into the closed set.
    pub fn from_tabular(mirror: &MirrorId, source: TabularError) -> Self {
        match source {
            TabularError::NotFound => SyncError::NotFoundExternal {
                mirror: mirror.clone(),
            },
            source => SyncError::External {
                mirror: mirror.clone(),
                source,
            },
        }
    }

    /// Whether repeating the same operation later can succeed without anyone
    /// repairing the mirror or the binding first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::External { .. }
                | SyncError::Roster(_)
                | SyncError::Registry(RegistryError::Io(_))
                | SyncError::Background(_)
        )
    }
}

impl From<RegistryError> for SyncError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateBinding { list, mirror } => {
                SyncError::DuplicateBinding { list, mirror }
            }
            other => SyncError::Registry(other),
        }
    }
}
