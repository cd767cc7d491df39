//! rollsheet core library: domain types, the durable binding registry,
//! configuration, errors.
//!
//! - [`types`]: newtypes, bindings, roster members, access criteria
//! - [`registry`]: [`BindingRegistry`], YAML-backed with atomic writes
//! - [`config`]: [`SyncConfig`] with defaults for every field
//! - [`error`]: [`RegistryError`]

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::SyncConfig;
pub use error::RegistryError;
pub use registry::BindingRegistry;
pub use types::{
    AccessCriteria, BindingId, BindingKey, Clause, ContactHandle, CredentialRef, ListId,
    MemberField, MemberId, MirrorId, RosterMember, SyncBinding,
};
