//! Error types for rollsheet-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ListId, MirrorId};

/// All errors that can arise from binding registry and configuration operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A binding for this (list, mirror) pair already exists.
    #[error("list {list} is already bound to mirror {mirror}")]
    DuplicateBinding { list: ListId, mirror: MirrorId },
}
