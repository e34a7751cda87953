// src/folder/lock.rs

//! Per-package exclusive lock
//!
//! Two processes installing the same package into a shared folder serialize
//! on `<root>/.locks/<id>.lock`. The lock is held with `flock(LOCK_EX)` and
//! released when the guard drops.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct PackageLock {
    file: File,
    path: PathBuf,
}

impl PackageLock {
    /// Acquire the lock, blocking until available
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        file.lock_exclusive()
            .map_err(|e| Error::IoError(format!("Failed to lock {}: {}", path.display(), e)))?;

        debug!("Acquired package lock {:?}", path);
        Ok(Self { file, path })
    }

    /// Try to acquire the lock without blocking
    ///
    /// `Ok(None)` means another holder has it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Package lock already held at {:?}", path);
                Ok(None)
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to try-lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".locks").join("a.lock");

        let lock = PackageLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        assert!(PackageLock::try_acquire(&path).unwrap().is_none());

        drop(lock);
        assert!(PackageLock::try_acquire(&path).unwrap().is_some());
    }
}
