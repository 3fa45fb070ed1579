//! Cross-process cycle lease.
//!
//! An applied cycle holds an exclusive advisory lock on
//! `~/.roster/run/cycle.lock` until the guard drops, so a one-shot
//! `roster sync` and the daemon never write the sheet at the same time.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::{io_err, DaemonError};
use crate::paths::{lease_path, run_dir};

/// Held lease; released on drop.
#[derive(Debug)]
pub struct CycleLease {
    file: File,
    path: PathBuf,
}

impl CycleLease {
    /// Take the lease without waiting. Fails with [`DaemonError::LeaseBusy`]
    /// when another holder has it.
    pub fn try_acquire(home: &Path) -> Result<Self, DaemonError> {
        let run = run_dir(home);
        if !run.exists() {
            fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
        }
        let path = lease_path(home);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "cycle lease acquired");
                Ok(Self { file, path })
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(DaemonError::LeaseBusy { path }),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CycleLease {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release cycle lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let home = TempDir::new().expect("home");

        let first = CycleLease::try_acquire(home.path()).expect("first lease");
        assert!(first.path().ends_with("run/cycle.lock"));

        let err = CycleLease::try_acquire(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::LeaseBusy { .. }), "got {err}");

        drop(first);
        CycleLease::try_acquire(home.path()).expect("lease after release");
    }

    #[test]
    fn lease_creates_run_dir() {
        let home = TempDir::new().expect("home");
        assert!(!run_dir(home.path()).exists());
        let _lease = CycleLease::try_acquire(home.path()).expect("lease");
        assert!(lease_path(home.path()).exists());
    }
}
