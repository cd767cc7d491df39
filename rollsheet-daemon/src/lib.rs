//! Roster event intake: a Unix-socket server feeding a [`SyncOrchestrator`].
//!
//! The host application owns the spreadsheet and roster collaborators; it
//! builds the orchestrator and hands it to [`run`] or [`start_blocking`].
//!
//! [`SyncOrchestrator`]: rollsheet_sync::SyncOrchestrator

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_event, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, BindingSummary};
