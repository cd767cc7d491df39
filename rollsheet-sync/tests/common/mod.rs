//! In-memory spreadsheet and roster fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use rollsheet_core::{
    AccessCriteria, BindingRegistry, CredentialRef, ListId, MemberId, MirrorId, RosterMember,
    SyncBinding, SyncConfig,
};
use rollsheet_sync::{
    CellRange, CreatedSheet, EditKind, RosterError, RosterSource, StructuralEdit,
    SyncOrchestrator, TabularApi, TabularError,
};

// ---------------------------------------------------------------------------
// Spreadsheet fake
// ---------------------------------------------------------------------------

/// Spreadsheets as grids of strings, plus a log of every mutating call.
#[derive(Default)]
pub struct FakeSheets {
    grids: Mutex<HashMap<MirrorId, Vec<Vec<String>>>>,
    mutations: Mutex<Vec<(MirrorId, String)>>,
    created: Mutex<u32>,
}

impl FakeSheets {
    /// A mirror whose column A is `ids` below a header row.
    pub fn seed(&self, mirror: &str, ids: &[&str]) {
        let mut grid = vec![vec!["Id".to_string()]];
        grid.extend(ids.iter().map(|id| vec![id.to_string()]));
        self.grids
            .lock()
            .unwrap()
            .insert(MirrorId::from(mirror), grid);
    }

    /// A mirror that exists but has nothing in it, not even a header.
    pub fn seed_blank(&self, mirror: &str) {
        self.grids
            .lock()
            .unwrap()
            .insert(MirrorId::from(mirror), vec![]);
    }

    pub fn delete(&self, mirror: &str) {
        self.grids.lock().unwrap().remove(&MirrorId::from(mirror));
    }

    /// Column A of `mirror`, header included.
    pub fn ids(&self, mirror: &str) -> Vec<String> {
        self.grids
            .lock()
            .unwrap()
            .get(&MirrorId::from(mirror))
            .map(|grid| {
                grid.iter()
                    .map(|row| row.first().cloned().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn row(&self, mirror: &str, sheet_row: usize) -> Vec<String> {
        self.grids.lock().unwrap()[&MirrorId::from(mirror)][sheet_row - 1].clone()
    }

    pub fn mutation_calls(&self, mirror: &str) -> usize {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m.as_str() == mirror)
            .count()
    }

    pub fn mutation_log(&self, mirror: &str) -> Vec<String> {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m.as_str() == mirror)
            .map(|(_, call)| call.clone())
            .collect()
    }

    fn record(&self, mirror: &MirrorId, call: String) {
        self.mutations.lock().unwrap().push((mirror.clone(), call));
    }
}

#[async_trait]
impl TabularApi for FakeSheets {
    async fn read_column(
        &self,
        _owner: &CredentialRef,
        mirror: &MirrorId,
        _column: &str,
    ) -> Result<Vec<String>, TabularError> {
        // Yield so concurrent operations genuinely interleave.
        tokio::task::yield_now().await;
        let grids = self.grids.lock().unwrap();
        let grid = grids.get(mirror).ok_or(TabularError::NotFound)?;
        Ok(grid
            .iter()
            .map(|row| row.first().cloned().unwrap_or_default())
            .collect())
    }

    async fn write_range(
        &self,
        _owner: &CredentialRef,
        mirror: &MirrorId,
        range: CellRange,
        values: Vec<Vec<String>>,
    ) -> Result<(), TabularError> {
        tokio::task::yield_now().await;
        {
            let mut grids = self.grids.lock().unwrap();
            let grid = grids.get_mut(mirror).ok_or(TabularError::NotFound)?;
            for (offset, row) in values.into_iter().enumerate() {
                let at = range.first_row as usize - 1 + offset;
                if grid.len() <= at {
                    grid.resize(at + 1, vec![]);
                }
                grid[at] = row;
            }
        }
        self.record(mirror, format!("write {range}"));
        Ok(())
    }

    async fn apply_structural_edit(
        &self,
        _owner: &CredentialRef,
        mirror: &MirrorId,
        edit: StructuralEdit,
    ) -> Result<(), TabularError> {
        tokio::task::yield_now().await;
        {
            let mut grids = self.grids.lock().unwrap();
            let grid = grids.get_mut(mirror).ok_or(TabularError::NotFound)?;
            let (start, end) = (edit.start as usize, edit.end as usize);
            match edit.kind {
                EditKind::InsertRows => {
                    if grid.len() < start {
                        grid.resize(start, vec![]);
                    }
                    for _ in start..end {
                        grid.insert(start, vec![]);
                    }
                }
                EditKind::DeleteRows => {
                    grid.drain(start..end.min(grid.len()));
                }
            }
        }
        self.record(mirror, format!("{:?} {}..{}", edit.kind, edit.start, edit.end));
        Ok(())
    }

    async fn create_sheet(
        &self,
        _owner: &CredentialRef,
        title: &str,
        _initial_rows: u32,
    ) -> Result<CreatedSheet, TabularError> {
        let mut created = self.created.lock().unwrap();
        *created += 1;
        let mirror = MirrorId::from(format!("{title}-{}", *created));
        self.grids.lock().unwrap().insert(mirror.clone(), vec![]);
        Ok(CreatedSheet {
            mirror,
            sheet_tab: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Roster fake
// ---------------------------------------------------------------------------

/// Lists of members, with per-mirror visibility criteria (default: everyone).
#[derive(Default)]
pub struct FakeRoster {
    lists: Mutex<HashMap<ListId, Vec<RosterMember>>>,
    criteria: Mutex<HashMap<MirrorId, AccessCriteria>>,
}

impl FakeRoster {
    pub fn add(&self, list: &str, member: RosterMember) {
        self.lists
            .lock()
            .unwrap()
            .entry(ListId::from(list))
            .or_default()
            .push(member);
    }

    pub fn remove(&self, list: &str, member: &str) {
        if let Some(members) = self.lists.lock().unwrap().get_mut(&ListId::from(list)) {
            members.retain(|m| m.id.as_str() != member);
        }
    }

    pub fn set_criteria(&self, mirror: &str, criteria: AccessCriteria) {
        self.criteria
            .lock()
            .unwrap()
            .insert(MirrorId::from(mirror), criteria);
    }
}

#[async_trait]
impl RosterSource for FakeRoster {
    async fn criteria_for(&self, binding: &SyncBinding) -> Result<AccessCriteria, RosterError> {
        Ok(self
            .criteria
            .lock()
            .unwrap()
            .get(&binding.mirror)
            .cloned()
            .unwrap_or_else(AccessCriteria::everyone))
    }

    async fn find_authorized_members(
        &self,
        list: &ListId,
        criteria: &AccessCriteria,
    ) -> Result<Vec<RosterMember>, RosterError> {
        let mut members: Vec<_> = self
            .lists
            .lock()
            .unwrap()
            .get(list)
            .into_iter()
            .flatten()
            .filter(|m| criteria.permits(m))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(members)
    }

    async fn lists_for_member(&self, member: &MemberId) -> Result<Vec<ListId>, RosterError> {
        let mut lists: Vec<_> = self
            .lists
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, members)| members.iter().any(|m| &m.id == member))
            .map(|(list, _)| list.clone())
            .collect();
        lists.sort();
        Ok(lists)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub home: TempDir,
    pub sheets: Arc<FakeSheets>,
    pub roster: Arc<FakeRoster>,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        let home = TempDir::new().expect("home");
        let registry = Arc::new(BindingRegistry::open_at(home.path()));
        let sheets = Arc::new(FakeSheets::default());
        let roster = Arc::new(FakeRoster::default());
        let orchestrator = SyncOrchestrator::new(
            registry,
            sheets.clone(),
            roster.clone(),
            &SyncConfig::default(),
        );
        Self {
            home,
            sheets,
            roster,
            orchestrator,
        }
    }

    pub fn bind(&self, list: &str, mirror: &str) -> SyncBinding {
        self.orchestrator
            .registry()
            .create(
                ListId::from(list),
                MirrorId::from(mirror),
                0,
                CredentialRef::from("owner-1"),
            )
            .expect("create binding")
    }

    pub fn bindings(&self, list: &str) -> Vec<SyncBinding> {
        self.orchestrator
            .registry()
            .find_by_list(&ListId::from(list))
            .expect("find bindings")
    }
}

pub fn member(id: &str, name: &str) -> RosterMember {
    RosterMember {
        id: MemberId::from(id),
        name: name.to_string(),
        given_name: name.to_string(),
        email: format!("{id}@example.org"),
        status: "active".to_string(),
        ..RosterMember::default()
    }
}

pub fn ids(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}
