// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files that wpclone reads or
//! produces outside of a site instance.

use std::path::{Path, PathBuf};

/// Determine default absolute path to the settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/wpclone/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("wpclone").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Default directory for site instance locks.
///
/// The system temporary directory rather than the destination folder,
/// because container, database, and network names are global to the local
/// daemon no matter where the site files are placed.
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Path of the advisory lock guarding one site instance.
pub fn lock_path(lock_dir: impl AsRef<Path>, container_name: &str) -> PathBuf {
    lock_dir
        .as_ref()
        .join(format!("wpclone-{container_name}.lock"))
}

/// Resolve destination folder to an absolute path.
///
/// Relative paths, including `.`, are joined onto `cwd`. Does not touch the
/// file system.
pub fn absolute_from(cwd: impl AsRef<Path>, folder: impl AsRef<Path>) -> PathBuf {
    let folder = folder.as_ref();
    if folder.is_absolute() {
        return folder.to_path_buf();
    }

    let mut resolved = cwd.as_ref().to_path_buf();
    for component in folder.components() {
        match component {
            std::path::Component::CurDir => continue,
            std::path::Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }

    resolved
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
