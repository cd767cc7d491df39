//! Identity column → row index resolution.
//!
//! Row numbers in a [`RowIndex`] are 1-based *data* rows: the header is sheet
//! row 1 and is never indexed, so data row `r` lives on sheet row `r + 1`.
//!
//! A `RowIndex` describes one snapshot of the column. It is deliberately not
//! `Clone`: structural mutations take it by value, so a caller cannot keep
//! using row numbers that the mutation has shifted.

use std::collections::HashMap;

use rollsheet_core::{MemberId, MirrorId};

use crate::error::SyncError;

#[derive(Debug, PartialEq, Eq)]
pub struct RowIndex {
    rows: HashMap<MemberId, u32>,
    append_at: u32,
}

impl RowIndex {
    /// Build the index from column A, sheet row 1 first.
    ///
    /// Row 1 is skipped whatever it contains. Blank data cells are skipped too:
    /// an insert interrupted between its two phases leaves one behind.
    pub fn resolve(mirror: &MirrorId, column: &[String]) -> Result<Self, SyncError> {
        if column.is_empty() {
            return Err(SyncError::CorruptMirrorState {
                mirror: mirror.clone(),
                reason: "identity column is empty (no header row)".to_string(),
            });
        }

        let mut rows = HashMap::with_capacity(column.len() - 1);
        for (offset, cell) in column.iter().enumerate().skip(1) {
            let id = cell.trim();
            if id.is_empty() {
                continue;
            }
            let row = offset as u32;
            if let Some(previous) = rows.insert(MemberId::from(id), row) {
                return Err(SyncError::CorruptMirrorState {
                    mirror: mirror.clone(),
                    reason: format!("member {id} appears on data rows {previous} and {row}"),
                });
            }
        }

        Ok(Self {
            rows,
            append_at: column.len() as u32,
        })
    }

    pub fn row_of(&self, member: &MemberId) -> Option<u32> {
        self.rows.get(member).copied()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.rows.contains_key(member)
    }

    /// Data row just past the last one the column reaches.
    pub fn append_at(&self) -> u32 {
        self.append_at
    }

    /// Number of indexed (non-blank) data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
