//! Durable binding registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.rollsheet/            (mode 0700)
//!   bindings.yaml          (every binding, mode 0600)
//!   bindings.lock          (advisory write lock, mode 0600, always empty)
//!   config.yaml            (see [`crate::config`])
//! ```
//!
//! # Atomicity
//!
//! Every mutation is a read-modify-write of `bindings.yaml` performed while
//! holding an exclusive advisory lock on `bindings.lock`, and the new document
//! replaces the old one through a `.tmp` sibling + `rename`. The lock is an OS
//! file lock, so the CLI and the daemon exclude each other as well as threads
//! of one process. Uniqueness of `(list, mirror)` is checked inside that
//! critical section, so concurrent creates cannot both succeed. Readers take
//! no lock: `rename` never exposes a half-written file.
//!
//! # API pattern
//!
//! [`BindingRegistry::open_at`] takes an explicit home (tests use a `TempDir`);
//! [`BindingRegistry::open`] derives it from `dirs::home_dir()`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::types::{BindingId, CredentialRef, ListId, MirrorId, SyncBinding};

const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.rollsheet/`: pure, no I/O.
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".rollsheet")
}

/// `<home>/.rollsheet/bindings.yaml`: pure, no I/O.
pub fn bindings_path_at(home: &Path) -> PathBuf {
    root_at(home).join("bindings.yaml")
}

/// `<home>/.rollsheet/bindings.lock`: pure, no I/O.
pub fn lock_path_at(home: &Path) -> PathBuf {
    root_at(home).join("bindings.lock")
}

/// Create `<home>/.rollsheet/` (mode `0700`) if absent.
pub fn ensure_root_at(home: &Path) -> Result<PathBuf, RegistryError> {
    let dir = root_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

pub(crate) fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. On-disk document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BindingsFile {
    version: u32,
    #[serde(default)]
    bindings: Vec<SyncBinding>,
    updated_at: DateTime<Utc>,
}

impl Default for BindingsFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            bindings: vec![],
            updated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Registry
// ---------------------------------------------------------------------------

/// YAML-backed store of list-to-mirror bindings.
#[derive(Debug)]
pub struct BindingRegistry {
    home: PathBuf,
}

impl BindingRegistry {
    /// Registry rooted at `home`. No I/O happens until the first call.
    pub fn open_at(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
        }
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, RegistryError> {
        Ok(Self::open_at(&home()?))
    }

    pub fn path(&self) -> PathBuf {
        bindings_path_at(&self.home)
    }

    /// Register a new binding.
    ///
    /// Returns [`RegistryError::DuplicateBinding`] if `list` is already bound
    /// to `mirror`.
    pub fn create(
        &self,
        list: ListId,
        mirror: MirrorId,
        sheet_tab: i64,
        owner: CredentialRef,
    ) -> Result<SyncBinding, RegistryError> {
        let mut lock = self.write_lock()?;
        let _guard = lock.write()?;
        let mut doc = self.load()?;
        if doc
            .bindings
            .iter()
            .any(|b| b.list == list && b.mirror == mirror)
        {
            return Err(RegistryError::DuplicateBinding { list, mirror });
        }

        let binding = SyncBinding {
            id: BindingId::generate(),
            list,
            mirror,
            sheet_tab,
            owner,
            created_at: Utc::now(),
        };
        doc.bindings.push(binding.clone());
        self.save(&mut doc)?;
        Ok(binding)
    }

    /// Remove a binding. Idempotent: returns `Ok(false)` if it was already gone.
    pub fn remove(&self, id: &BindingId) -> Result<bool, RegistryError> {
        let mut lock = self.write_lock()?;
        let _guard = lock.write()?;
        let mut doc = self.load()?;
        let before = doc.bindings.len();
        doc.bindings.retain(|b| &b.id != id);
        if doc.bindings.len() == before {
            return Ok(false);
        }
        self.save(&mut doc)?;
        Ok(true)
    }

    /// All bindings of one list, in no particular order.
    pub fn find_by_list(&self, list: &ListId) -> Result<Vec<SyncBinding>, RegistryError> {
        Ok(self
            .load()?
            .bindings
            .into_iter()
            .filter(|b| &b.list == list)
            .collect())
    }

    /// All bindings of any of `lists`.
    pub fn find_by_lists(&self, lists: &[ListId]) -> Result<Vec<SyncBinding>, RegistryError> {
        Ok(self
            .load()?
            .bindings
            .into_iter()
            .filter(|b| lists.contains(&b.list))
            .collect())
    }

    pub fn get(&self, id: &BindingId) -> Result<Option<SyncBinding>, RegistryError> {
        Ok(self.load()?.bindings.into_iter().find(|b| &b.id == id))
    }

    /// Every binding, sorted by list then mirror.
    pub fn list_all(&self) -> Result<Vec<SyncBinding>, RegistryError> {
        let mut all = self.load()?.bindings;
        all.sort_by(|a, b| (&a.list, &a.mirror).cmp(&(&b.list, &b.mirror)));
        Ok(all)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Open (creating if needed) the lock file. Callers hold `.write()` on it
    /// for the whole load → check → save sequence; the OS drops the lock when
    /// the guard or the process goes away.
    fn write_lock(&self) -> Result<RwLock<File>, RegistryError> {
        ensure_root_at(&self.home)?;
        let path = lock_path_at(&self.home);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        set_file_permissions(&path)?;
        Ok(RwLock::new(file))
    }

    /// Missing file reads as an empty registry.
    fn load(&self) -> Result<BindingsFile, RegistryError> {
        let path = self.path();
        if !path.exists() {
            return Ok(BindingsFile::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse { path, source: e })
    }

    /// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
    fn save(&self, doc: &mut BindingsFile) -> Result<(), RegistryError> {
        ensure_root_at(&self.home)?;
        doc.version = FORMAT_VERSION;
        doc.updated_at = Utc::now();

        let path = self.path();
        let tmp_path = path.with_file_name("bindings.yaml.tmp");
        let yaml = serde_yaml::to_string(doc)?;
        std::fs::write(&tmp_path, yaml)?;
        set_file_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
pub(crate) fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
