//! Advisory lock guarding a storage root against a second rq process

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, RewriteError};

/// Exclusive lock on `<root>/.lock`, released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Try to take the lock without blocking
    pub fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(".lock");
        debug!(path = %path.display(), "StoreLock::acquire: called");

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| RewriteError::io(&path, e))?;

        if file.try_lock_exclusive().is_err() {
            debug!("StoreLock::acquire: lock held elsewhere");
            return Err(RewriteError::StoreBusy(root.to_path_buf()));
        }

        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_busy() {
        let temp = TempDir::new().unwrap();
        let first = StoreLock::acquire(temp.path()).unwrap();

        let second = StoreLock::acquire(temp.path());
        assert!(matches!(second, Err(RewriteError::StoreBusy(_))));

        drop(first);
        assert!(StoreLock::acquire(temp.path()).is_ok());
    }
}
