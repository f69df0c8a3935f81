// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Advisory locking of site instances.
//!
//! Two clones of the same domain would fight over one container, one
//! database, and one network. Each run holds an exclusive lock keyed on the
//! container name while it mutates anything. The lock is released when the
//! guard drops, including on early return through `?`.

use fs2::FileExt;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Held exclusive lock on a site instance.
#[derive(Debug)]
pub struct SiteLock {
    file: File,
    path: PathBuf,
}

impl SiteLock {
    /// Acquire lock without waiting.
    ///
    /// # Errors
    ///
    /// - Return [`LockError::Busy`] if another process holds the lock.
    /// - Return [`LockError::Open`] if lock file cannot be opened.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                source,
                path: path.clone(),
            })?;

        FileExt::try_lock_exclusive(&file).map_err(|_| LockError::Busy(path.clone()))?;
        debug!("acquired lock {}", path.display());

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SiteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("released lock {}", self.path.display());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to open lock file {path:?}")]
    Open {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("another clone holds {0:?}")]
    Busy(PathBuf),
}

/// Friendly result alias :3
type Result<T, E = LockError> = std::result::Result<T, E>;
