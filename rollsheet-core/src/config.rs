//! Mirror layout configuration, `<home>/.rollsheet/config.yaml`.
//!
//! Every field has a default, so a missing file or a partial document is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::registry::{ensure_root_at, home, root_at, set_file_permissions};

/// Number of columns in a mirror row: the id plus twelve member fields.
pub const MIRROR_WIDTH: usize = 13;

/// Settings shared by every mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Row 1 labels, one per mirror column.
    pub header: [String; MIRROR_WIDTH],
    /// Contact handle kind written to the handle column.
    pub preferred_handle: String,
    /// Rows requested when a new mirror is provisioned.
    pub initial_row_capacity: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            header: [
                "Id",
                "Given name",
                "Family name",
                "Job title",
                "Organization",
                "Groups",
                "Roles",
                "Country",
                "Region",
                "Phone number",
                "Skype",
                "Email",
                "Status",
            ]
            .map(String::from),
            preferred_handle: "Skype".to_string(),
            initial_row_capacity: 10_000,
        }
    }
}

/// `<home>/.rollsheet/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

impl SyncConfig {
    /// Load the configuration, falling back to defaults if the file is absent.
    pub fn load_at(home: &Path) -> Result<Self, RegistryError> {
        let path = config_path_at(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse { path, source: e })
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, RegistryError> {
        Self::load_at(&home()?)
    }

    /// Atomically write the configuration (`.tmp` + rename, mode 0600).
    pub fn save_at(&self, home: &Path) -> Result<PathBuf, RegistryError> {
        ensure_root_at(home)?;
        let path = config_path_at(home);
        let tmp = path.with_file_name("config.yaml.tmp");
        std::fs::write(&tmp, serde_yaml::to_string(self)?)?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }
}
