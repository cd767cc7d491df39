use std::path::{Path, PathBuf};

use rollsheet_core::registry::root_at;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn rollsheet_root(home: &Path) -> PathBuf {
    root_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    rollsheet_root(home).join(DAEMON_SOCKET)
}
