//! Run lock guarding the checkpoint file
//!
//! A fetch run holds an exclusive advisory lock (fd-lock) on
//! `<checkpoint>.lock` for its whole duration, so a second process pointed at
//! the same checkpoint file fails fast instead of interleaving writes.

use super::state::ResumeError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file handle for one checkpoint file
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Open (creating if needed) the lock file next to `checkpoint_path`
    pub fn open(checkpoint_path: &Path) -> Result<Self, ResumeError> {
        if let Some(parent) = checkpoint_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
            }
        }

        let path = lock_path_for(checkpoint_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
            path,
        })
    }

    /// Try to take the exclusive lock without blocking.
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn try_exclusive(&mut self) -> Result<RwLockWriteGuard<'_, File>, ResumeError> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "{path} is held by another run ({e}); refusing to write concurrently"
            ))
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path_for(checkpoint_path: &Path) -> PathBuf {
    let mut name = checkpoint_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "checkpoint".into());
    name.push(".lock");
    checkpoint_path.with_file_name(name)
}
