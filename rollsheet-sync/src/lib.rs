//! # rollsheet-sync
//!
//! Roster-to-spreadsheet synchronization engine.
//!
//! A roster event enters [`SyncOrchestrator`], which fans it out to every
//! binding of the affected list. Per binding, the mirror's identity column is
//! resolved into a [`RowIndex`], the member is encoded by [`RowCodec`], and the
//! physical change is issued through [`MutationExecutor`]. Each binding yields
//! its own [`BindingReport`]; one failing mirror never blocks the others.

pub mod codec;
pub mod collab;
pub mod error;
pub mod executor;
pub mod index;
pub mod lock;
pub mod orchestrator;
pub mod outcome;

pub use codec::{MirrorRow, RowCodec};
pub use collab::{
    CellRange, CreatedSheet, EditKind, RosterError, RosterSource, StructuralEdit, TabularApi,
    TabularError,
};
pub use error::SyncError;
pub use executor::MutationExecutor;
pub use index::RowIndex;
pub use lock::{BindingGuard, BindingLocks};
pub use orchestrator::SyncOrchestrator;
pub use outcome::{BindingReport, Change, Outcome};
