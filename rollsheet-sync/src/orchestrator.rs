//! Roster event fan-out.
//!
//! Every entry point loads the bindings concerned, services them concurrently
//! (one [`futures::future::join_all`] per event), and returns one
//! [`BindingReport`] per binding. Within a binding the whole
//! read-index → mutate sequence runs under that binding's lock.
//!
//! Per-binding flow:
//! 1. Resolve the owner's criteria; empty criteria fail closed.
//! 2. Read the identity column into a fresh [`RowIndex`].
//! 3. Decide insert / update / delete / no-op and encode the member.
//! 4. Execute. A vanished mirror unlinks the binding.

use std::sync::Arc;

use futures::future::join_all;

use rollsheet_core::{
    BindingId, BindingRegistry, CredentialRef, ListId, MemberId, RegistryError, RosterMember,
    SyncBinding, SyncConfig,
};

use crate::codec::RowCodec;
use crate::collab::{RosterSource, TabularApi};
use crate::error::SyncError;
use crate::executor::MutationExecutor;
use crate::index::RowIndex;
use crate::lock::BindingLocks;
use crate::outcome::{BindingReport, Change, Outcome};

/// One roster event, as applied to a single binding.
#[derive(Debug, Clone, Copy)]
enum Event<'a> {
    Added(&'a RosterMember),
    Updated(&'a RosterMember),
    Removed(&'a MemberId),
    Resync,
}

pub struct SyncOrchestrator {
    registry: Arc<BindingRegistry>,
    tabular: Arc<dyn TabularApi>,
    roster: Arc<dyn RosterSource>,
    codec: RowCodec,
    locks: BindingLocks,
    initial_row_capacity: u32,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<BindingRegistry>,
        tabular: Arc<dyn TabularApi>,
        roster: Arc<dyn RosterSource>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            registry,
            tabular,
            roster,
            codec: RowCodec::new(config),
            locks: BindingLocks::new(),
            initial_row_capacity: config.initial_row_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<BindingRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Insert `member` into every mirror of `list`, at its name-ordered position.
    pub async fn member_added(
        &self,
        list: &ListId,
        member: &RosterMember,
    ) -> Result<Vec<BindingReport>, SyncError> {
        let bindings = self.bindings_of(list).await?;
        Ok(self.fan_out(bindings, Event::Added(member)).await)
    }

    /// Rewrite `member`'s row in every mirror of `list`.
    pub async fn member_updated(
        &self,
        list: &ListId,
        member: &RosterMember,
    ) -> Result<Vec<BindingReport>, SyncError> {
        let bindings = self.bindings_of(list).await?;
        Ok(self.fan_out(bindings, Event::Updated(member)).await)
    }

    /// Delete the member's row from every mirror of `list`.
    pub async fn member_removed(
        &self,
        list: &ListId,
        member: &MemberId,
    ) -> Result<Vec<BindingReport>, SyncError> {
        let bindings = self.bindings_of(list).await?;
        Ok(self.fan_out(bindings, Event::Removed(member)).await)
    }

    /// Propagate a profile change to the mirrors of every list `member` is on.
    pub async fn member_changed(
        &self,
        member: &RosterMember,
    ) -> Result<Vec<BindingReport>, SyncError> {
        let lists = self.roster.lists_for_member(&member.id).await?;
        if lists.is_empty() {
            return Ok(vec![]);
        }
        let bindings = self
            .with_registry(move |registry| registry.find_by_lists(&lists))
            .await?;
        Ok(self.fan_out(bindings, Event::Updated(member)).await)
    }

    /// Rewrite one binding's mirror from the roster snapshot.
    pub async fn full_resync(
        &self,
        list: &ListId,
        binding: &BindingId,
    ) -> Result<BindingReport, SyncError> {
        let id = binding.clone();
        let found = self
            .with_registry(move |registry| registry.get(&id))
            .await?
            .filter(|b| &b.list == list)
            .ok_or_else(|| SyncError::UnknownBinding {
                binding: binding.clone(),
            })?;
        Ok(self.service(found, Event::Resync).await)
    }

    /// Create a spreadsheet for `list`, bind it, and fill it.
    pub async fn provision_mirror(
        &self,
        list: &ListId,
        title: &str,
        owner: &CredentialRef,
    ) -> Result<BindingReport, SyncError> {
        let created = self
            .tabular
            .create_sheet(owner, title, self.initial_row_capacity)
            .await
            .map_err(|source| SyncError::External {
                mirror: title.into(),
                source,
            })?;
        tracing::info!(list = %list, mirror = %created.mirror, "provisioned mirror");

        let (list_id, owner) = (list.clone(), owner.clone());
        let binding = self
            .with_registry(move |registry| {
                registry.create(list_id, created.mirror, created.sheet_tab, owner)
            })
            .await?;
        Ok(self.service(binding, Event::Resync).await)
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    async fn fan_out(&self, bindings: Vec<SyncBinding>, event: Event<'_>) -> Vec<BindingReport> {
        join_all(bindings.into_iter().map(|b| self.service(b, event))).await
    }

    async fn service(&self, binding: SyncBinding, event: Event<'_>) -> BindingReport {
        let result = {
            let _guard = self.locks.acquire(binding.key()).await;
            self.apply(&binding, event).await
        };

        let outcome = match result {
            Ok(change) => {
                if change.mutated() {
                    tracing::info!(binding = %binding.id, mirror = %binding.mirror, %change, "mirror updated");
                } else {
                    tracing::debug!(binding = %binding.id, mirror = %binding.mirror, %change, "no mirror change");
                }
                Outcome::Applied(change)
            }
            Err(SyncError::NotFoundExternal { .. }) => self.unlink(&binding).await,
            Err(err) => {
                match &err {
                    SyncError::CorruptMirrorState { .. } => {
                        tracing::error!(binding = %binding.id, mirror = %binding.mirror, error = %err, "mirror is corrupt");
                    }
                    _ => {
                        tracing::warn!(binding = %binding.id, mirror = %binding.mirror, error = %err, "binding operation failed");
                    }
                }
                Outcome::Failed(err)
            }
        };
        BindingReport { binding, outcome }
    }

    async fn apply(&self, binding: &SyncBinding, event: Event<'_>) -> Result<Change, SyncError> {
        let criteria = self.roster.criteria_for(binding).await?;
        if criteria.is_empty() {
            return Err(SyncError::AuthorizationDenied {
                binding: binding.id.clone(),
            });
        }
        let exec = MutationExecutor::new(self.tabular.as_ref(), binding);

        match event {
            Event::Added(member) => {
                if !criteria.permits(member) {
                    return Ok(Change::NotVisible);
                }
                let index = exec.fetch_index().await?;
                if let Some(row) = index.row_of(&member.id) {
                    return Ok(Change::AlreadyPresent { row });
                }
                let snapshot = self
                    .roster
                    .find_authorized_members(&binding.list, &criteria)
                    .await?;
                let row = insertion_row(&index, &snapshot, member);
                exec.insert_row(index, row, &self.codec.encode(member)).await?;
                Ok(Change::Inserted { row })
            }
            Event::Updated(member) => {
                let index = exec.fetch_index().await?;
                let row = index
                    .row_of(&member.id)
                    .ok_or_else(|| SyncError::RowNotFound {
                        mirror: binding.mirror.clone(),
                        member: member.id.clone(),
                    })?;
                exec.update_row(&index, row, &self.codec.encode(member)).await?;
                Ok(Change::Updated { row })
            }
            Event::Removed(member) => {
                let index = exec.fetch_index().await?;
                match index.row_of(member) {
                    Some(row) => {
                        exec.delete_row(index, row).await?;
                        Ok(Change::Deleted { row })
                    }
                    None => Ok(Change::NotPresent),
                }
            }
            Event::Resync => {
                let snapshot = self
                    .roster
                    .find_authorized_members(&binding.list, &criteria)
                    .await?;
                let rows: Vec<_> = snapshot.iter().map(|m| self.codec.encode(m)).collect();
                exec.bulk_rewrite(self.codec.header(), &rows).await?;
                Ok(Change::Rewritten { rows: rows.len() })
            }
        }
    }

    /// ACTIVE → UNLINKED. Terminal: a new binding must be created to resume.
    async fn unlink(&self, binding: &SyncBinding) -> Outcome {
        let id = binding.id.clone();
        match self.with_registry(move |registry| registry.remove(&id)).await {
            Ok(_) => {
                tracing::warn!(
                    binding = %binding.id,
                    list = %binding.list,
                    mirror = %binding.mirror,
                    "mirror no longer exists; binding unlinked",
                );
                Outcome::Unlinked
            }
            Err(err) => {
                tracing::error!(binding = %binding.id, error = %err, "failed to unlink binding");
                Outcome::Failed(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Registry access
    // -----------------------------------------------------------------------

    async fn bindings_of(&self, list: &ListId) -> Result<Vec<SyncBinding>, SyncError> {
        let list = list.clone();
        self.with_registry(move |registry| registry.find_by_list(&list))
            .await
    }

    /// Registry calls are blocking file I/O; keep them off the async workers.
    async fn with_registry<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&BindingRegistry) -> Result<T, RegistryError> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || f(&registry))
            .await
            .map_err(|err| SyncError::Background(format!("registry task: {err}")))?
            .map_err(SyncError::from)
    }
}

/// Data row at which `member` goes so the mirror stays in snapshot order.
///
/// The member lands right after the last row held by anyone who precedes it in
/// the snapshot, or on data row 1 if nobody does. If the snapshot does not yet
/// contain the member, its position is found by sort key.
fn insertion_row(index: &RowIndex, snapshot: &[RosterMember], member: &RosterMember) -> u32 {
    let position = snapshot
        .iter()
        .position(|m| m.id == member.id)
        .unwrap_or_else(|| snapshot.partition_point(|m| m.sort_key() < member.sort_key()));
    snapshot[..position]
        .iter()
        .filter_map(|m| index.row_of(&m.id))
        .max()
        .map_or(1, |row| row + 1)
}
