//! Cross-process run lock
//!
//! The orchestrator admits one operation per process. This advisory lock
//! extends that to every `usbforge` process on the machine.

use anyhow::{Context, Result, bail};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

/// Lock file name inside the runtime directory
pub const LOCK_FILE: &str = "usbforge.lock";

/// Held for the lifetime of one destructive operation
#[derive(Debug)]
pub struct RunLock {
    // Unlocked when closed
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Lock in `$XDG_RUNTIME_DIR`, falling back to the temp dir
    pub fn acquire() -> Result<Self> {
        let dir = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self::acquire_at(&dir.join(LOCK_FILE))
    }

    /// Take the lock at `path` without waiting
    pub fn acquire_at(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        match file.try_lock() {
            Ok(()) => {
                log::debug!("Holding run lock {}", path.display());
                Ok(Self {
                    _file: file,
                    path: path.to_path_buf(),
                })
            }
            Err(TryLockError::WouldBlock) => bail!(
                "Another usbforge operation is already running (lock held on {})",
                path.display()
            ),
            Err(TryLockError::Error(e)) => {
                Err(e).with_context(|| format!("Failed to lock {}", path.display()))
            }
        }
    }

}

impl Drop for RunLock {
    fn drop(&mut self) {
        log::debug!("Released run lock {}", self.path.display());
    }
}
