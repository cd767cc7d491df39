//! Collaborator seams: the external spreadsheet API and the roster store.
//!
//! Neither is implemented in this workspace. Host applications supply
//! implementations (an HTTP client for the spreadsheet service, a database
//! query layer for the roster); tests supply in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use rollsheet_core::{
    AccessCriteria, CredentialRef, ListId, MemberId, MirrorId, RosterMember, SyncBinding,
};

use crate::codec::LAST_COLUMN;

// ---------------------------------------------------------------------------
// Spreadsheet API
// ---------------------------------------------------------------------------

/// A rectangular A1-notation range, e.g. `A2:M2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_column: char,
    pub first_row: u32,
    pub last_column: char,
    pub last_row: u32,
}

impl CellRange {
    /// Full-width mirror rows `first_row..=last_row` (1-based sheet rows).
    pub fn rows(first_row: u32, last_row: u32) -> Self {
        Self {
            first_column: 'A',
            first_row,
            last_column: LAST_COLUMN,
            last_row,
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            self.first_column, self.first_row, self.last_column, self.last_row
        )
    }
}

/// Direction of a structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    InsertRows,
    DeleteRows,
}

/// Structural row edit on one tab. `start..end` are 0-based sheet row indices,
/// end exclusive, so index 0 is the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralEdit {
    pub kind: EditKind,
    pub sheet_tab: i64,
    pub start: u32,
    pub end: u32,
}

/// A freshly created spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSheet {
    pub mirror: MirrorId,
    pub sheet_tab: i64,
}

/// Failures reported by a [`TabularApi`] implementation.
#[derive(Debug, Error)]
pub enum TabularError {
    /// The spreadsheet does not exist (or is no longer shared with the owner).
    #[error("spreadsheet not found")]
    NotFound,

    /// Any other non-success response.
    #[error("spreadsheet API returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The request never produced a response.
    #[error("spreadsheet API transport failure: {0}")]
    Transport(String),
}

impl TabularError {
    /// Classify an HTTP-style status code; 404 becomes [`TabularError::NotFound`].
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        if code == 404 {
            TabularError::NotFound
        } else {
            TabularError::Status {
                code,
                message: message.into(),
            }
        }
    }
}

/// Range reads/writes and structural edits against an external spreadsheet.
///
/// Timeouts and retries are the implementation's concern.
#[async_trait]
pub trait TabularApi: Send + Sync {
    /// Every cell of `column`, row 1 first. Blank cells read as `""`.
    async fn read_column(
        &self,
        owner: &CredentialRef,
        mirror: &MirrorId,
        column: &str,
    ) -> Result<Vec<String>, TabularError>;

    /// Overwrite `range` with `values` (one inner vector per row), raw input.
    async fn write_range(
        &self,
        owner: &CredentialRef,
        mirror: &MirrorId,
        range: CellRange,
        values: Vec<Vec<String>>,
    ) -> Result<(), TabularError>;

    async fn apply_structural_edit(
        &self,
        owner: &CredentialRef,
        mirror: &MirrorId,
        edit: StructuralEdit,
    ) -> Result<(), TabularError>;

    async fn create_sheet(
        &self,
        owner: &CredentialRef,
        title: &str,
        initial_rows: u32,
    ) -> Result<CreatedSheet, TabularError>;
}

// ---------------------------------------------------------------------------
// Roster store
// ---------------------------------------------------------------------------

/// Failure reported by a [`RosterSource`] implementation.
#[derive(Debug, Error)]
#[error("roster store error: {0}")]
pub struct RosterError(pub String);

/// Query surface of the authoritative roster.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Visibility filter of the binding's owner on the binding's list.
    async fn criteria_for(&self, binding: &SyncBinding) -> Result<AccessCriteria, RosterError>;

    /// Members of `list` permitted by `criteria`, sorted by name ascending.
    async fn find_authorized_members(
        &self,
        list: &ListId,
        criteria: &AccessCriteria,
    ) -> Result<Vec<RosterMember>, RosterError>;

    /// Every list the member belongs to.
    async fn lists_for_member(&self, member: &MemberId) -> Result<Vec<ListId>, RosterError>;
}
