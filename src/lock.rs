//! Per-host instance lock preventing two runs against the same library
//! root from starting concurrently.
//!
//! No teacher file covers this directly; written in the same
//! small-focused-helper-with-its-own-error-enum shape used throughout this
//! codebase, using `OpenOptions::create_new` for exclusive lock-file
//! creation instead of a platform `flock` binding.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run is already in progress (pid {pid}, started {started_at}); pass --force to override")]
    AlreadyLocked { pid: u32, started_at: String },
    #[error("io error acquiring instance lock: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds an exclusive lock file for the lifetime of the value; dropped (or
/// explicitly released) at run end.
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquires the lock at `library_root/.paperbot.lock`. If `force` is
    /// set, an existing lock file is removed instead of raising an error,
    /// mirroring the CLI's `--force` override.
    pub fn acquire(library_root: &Path, force: bool) -> Result<Self, LockError> {
        let path = library_root.join(".paperbot.lock");

        if path.is_file() {
            if force {
                warn!(path = %path.display(), "removing stale instance lock (--force)");
                let _ = std::fs::remove_file(&path);
            } else {
                let contents = std::fs::read_to_string(&path).unwrap_or_default();
                let mut parts = contents.splitn(2, '\n');
                let pid = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
                let started_at = parts.next().unwrap_or("unknown").trim().to_string();
                return Err(LockError::AlreadyLocked { pid, started_at });
            }
        }

        std::fs::create_dir_all(library_root)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        writeln!(file, "{}\n{}", std::process::id(), chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;

        Ok(Self { path })
    }

    pub fn release(self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_acquire_without_force_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = InstanceLock::acquire(dir.path(), false).expect("first lock");
        let err = InstanceLock::acquire(dir.path(), false).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked { .. }));
        lock.release();
    }

    #[test]
    fn acquire_with_force_overrides_stale_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = InstanceLock::acquire(dir.path(), false).expect("first lock");
        std::mem::forget(first);
        let second = InstanceLock::acquire(dir.path(), true);
        assert!(second.is_ok());
    }

    #[test]
    fn release_removes_lock_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".paperbot.lock");
        let lock = InstanceLock::acquire(dir.path(), false).expect("lock");
        lock.release();
        assert!(!path.exists());
    }
}
