//! Physical mirror mutations.
//!
//! | Operation      | Calls                                  | Shifts rows |
//! |----------------|----------------------------------------|-------------|
//! | `insert_row`   | structural insert, then value write    | yes         |
//! | `update_row`   | value write                            | no          |
//! | `delete_row`   | structural delete                      | yes         |
//! | `bulk_rewrite` | one value write from `A1`              | no          |
//!
//! `insert_row` is two calls and not atomic: if the process dies between them
//! the mirror keeps a blank row until the next full resync. [`RowIndex`]
//! resolution skips blank rows, so incremental operations keep working.
//!
//! `bulk_rewrite` never clears rows past the ones it writes; a roster that
//! shrank leaves its old tail in place.

use rollsheet_core::SyncBinding;

use crate::codec::{MirrorRow, IDENTITY_COLUMN};
use crate::collab::{CellRange, EditKind, StructuralEdit, TabularApi};
use crate::error::SyncError;
use crate::index::RowIndex;

/// Issues mutations against the mirror of one binding, as its owner.
pub struct MutationExecutor<'a> {
    api: &'a dyn TabularApi,
    binding: &'a SyncBinding,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(api: &'a dyn TabularApi, binding: &'a SyncBinding) -> Self {
        Self { api, binding }
    }

    /// Read the identity column and resolve a fresh [`RowIndex`].
    pub async fn fetch_index(&self) -> Result<RowIndex, SyncError> {
        let column = self
            .api
            .read_column(&self.binding.owner, &self.binding.mirror, IDENTITY_COLUMN)
            .await
            .map_err(|e| SyncError::from_tabular(&self.binding.mirror, e))?;
        let index = RowIndex::resolve(&self.binding.mirror, &column)?;
        tracing::debug!(
            mirror = %self.binding.mirror,
            rows = index.len(),
            append_at = index.append_at(),
            "resolved row index",
        );
        Ok(index)
    }

    /// Open a blank row at data row `row` and fill it with `values`.
    ///
    /// `row` may be anything from 1 to `index.append_at()` (append). The index
    /// is consumed: every row number at or after `row` is now one higher.
    pub async fn insert_row(
        &self,
        index: RowIndex,
        row: u32,
        values: &MirrorRow,
    ) -> Result<(), SyncError> {
        check_row(row, index.append_at())?;
        self.structural(EditKind::InsertRows, row).await?;
        self.write_rows(CellRange::rows(row + 1, row + 1), vec![values.to_vec()]).await
    }

    /// Overwrite data row `row`. Idempotent; the index stays valid.
    pub async fn update_row(
        &self,
        index: &RowIndex,
        row: u32,
        values: &MirrorRow,
    ) -> Result<(), SyncError> {
        check_row(row, index.append_at().saturating_sub(1))?;
        self.write_rows(CellRange::rows(row + 1, row + 1), vec![values.to_vec()]).await
    }

    /// Remove exactly data row `row`. The index is consumed.
    pub async fn delete_row(&self, index: RowIndex, row: u32) -> Result<(), SyncError> {
        check_row(row, index.append_at().saturating_sub(1))?;
        self.structural(EditKind::DeleteRows, row).await
    }

    /// Write the header and every row in one call covering `A1:M{1 + rows}`.
    pub async fn bulk_rewrite(
        &self,
        header: &MirrorRow,
        rows: &[MirrorRow],
    ) -> Result<(), SyncError> {
        let mut values = Vec::with_capacity(rows.len() + 1);
        values.push(header.to_vec());
        values.extend(rows.iter().map(|r| r.to_vec()));
        self.write_rows(CellRange::rows(1, values.len() as u32), values)
            .await
    }

    async fn structural(&self, kind: EditKind, row: u32) -> Result<(), SyncError> {
        // Data row `r` is 0-based sheet index `r` because the header holds index 0.
        let edit = StructuralEdit {
            kind,
            sheet_tab: self.binding.sheet_tab,
            start: row,
            end: row + 1,
        };
        self.api
            .apply_structural_edit(&self.binding.owner, &self.binding.mirror, edit)
            .await
            .map_err(|e| SyncError::from_tabular(&self.binding.mirror, e))
    }

    async fn write_rows(
        &self,
        range: CellRange,
        values: Vec<Vec<String>>,
    ) -> Result<(), SyncError> {
        self.api
            .write_range(&self.binding.owner, &self.binding.mirror, range, values)
            .await
            .map_err(|e| SyncError::from_tabular(&self.binding.mirror, e))
    }
}

fn check_row(row: u32, limit: u32) -> Result<(), SyncError> {
    if row == 0 || row > limit {
        return Err(SyncError::InvalidRow { row, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use rollsheet_core::{BindingId, CredentialRef, ListId, MirrorId};

    use crate::collab::{CreatedSheet, TabularError};

    #[derive(Debug, PartialEq)]
    enum Call {
        Write(String, usize),
        Edit(EditKind, u32, u32),
    }

    #[derive(Default)]
    struct Recorder {
        column: Vec<String>,
        calls: Mutex<Vec<Call>>,
    }

    #[async_trait]
    impl TabularApi for Recorder {
        async fn read_column(
            &self,
            _owner: &CredentialRef,
            _mirror: &MirrorId,
            _column: &str,
        ) -> Result<Vec<String>, TabularError> {
            Ok(self.column.clone())
        }

        async fn write_range(
            &self,
            _owner: &CredentialRef,
            _mirror: &MirrorId,
            range: CellRange,
            values: Vec<Vec<String>>,
        ) -> Result<(), TabularError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Write(range.to_string(), values.len()));
            Ok(())
        }

        async fn apply_structural_edit(
            &self,
            _owner: &CredentialRef,
            _mirror: &MirrorId,
            edit: StructuralEdit,
        ) -> Result<(), TabularError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Edit(edit.kind, edit.start, edit.end));
            Ok(())
        }

        async fn create_sheet(
            &self,
            _owner: &CredentialRef,
            _title: &str,
            _initial_rows: u32,
        ) -> Result<CreatedSheet, TabularError> {
            Err(TabularError::Transport("unsupported".into()))
        }
    }

    fn binding() -> SyncBinding {
        SyncBinding {
            id: BindingId::from("b-1"),
            list: ListId::from("l-1"),
            mirror: MirrorId::from("s-1"),
            sheet_tab: 7,
            owner: CredentialRef::from("owner"),
            created_at: Utc::now(),
        }
    }

    fn recorder(cells: &[&str]) -> Recorder {
        Recorder {
            column: cells.iter().map(|c| c.to_string()).collect(),
            calls: Mutex::new(vec![]),
        }
    }

    fn row() -> MirrorRow {
        MirrorRow::default()
    }

    #[tokio::test]
    async fn insert_opens_row_then_writes_it() {
        let api = recorder(&["Id", "2", "5", "9"]);
        let binding = binding();
        let exec = MutationExecutor::new(&api, &binding);
        let index = exec.fetch_index().await.unwrap();
        exec.insert_row(index, 3, &row()).await.unwrap();

        let calls = api.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                Call::Edit(EditKind::InsertRows, 3, 4),
                Call::Write("A4:M4".into(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn update_is_a_single_write() {
        let api = recorder(&["Id", "2", "5"]);
        let binding = binding();
        let exec = MutationExecutor::new(&api, &binding);
        let index = exec.fetch_index().await.unwrap();
        exec.update_row(&index, 2, &row()).await.unwrap();
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![Call::Write("A3:M3".into(), 1)]
        );
    }

    #[tokio::test]
    async fn delete_is_a_single_structural_edit() {
        let api = recorder(&["Id", "2", "5"]);
        let binding = binding();
        let exec = MutationExecutor::new(&api, &binding);
        let index = exec.fetch_index().await.unwrap();
        exec.delete_row(index, 1).await.unwrap();
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![Call::Edit(EditKind::DeleteRows, 1, 2)]
        );
    }

    #[tokio::test]
    async fn rows_outside_the_index_are_rejected_before_any_call() {
        let api = recorder(&["Id", "2"]);
        let binding = binding();
        let exec = MutationExecutor::new(&api, &binding);

        let index = exec.fetch_index().await.unwrap();
        let err = exec.update_row(&index, 2, &row()).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRow { row: 2, limit: 1 }));

        let err = exec.insert_row(index, 0, &row()).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRow { row: 0, .. }));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_rewrite_covers_header_and_rows() {
        let api = recorder(&["Id"]);
        let binding = binding();
        let exec = MutationExecutor::new(&api, &binding);
        exec.bulk_rewrite(&row(), &[row(), row(), row()])
            .await
            .unwrap();
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![Call::Write("A1:M4".into(), 4)]
        );
    }
}
