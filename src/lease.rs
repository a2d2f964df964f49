//! Per-issue lease: an advisory file lock held for the duration of one phase
//! run so two engine instances never work the same issue at once.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::errors::EngineError;
use crate::util::issue_slug;

/// Held lease. Unlocked when dropped.
#[derive(Debug)]
pub struct Lease {
    file: File,
    path: PathBuf,
}

impl Lease {
    /// Try to take the lease for `issue_id` under `dir`. `Ok(None)` means another
    /// process holds it.
    pub fn try_acquire(dir: &Path, issue_id: &str) -> Result<Option<Lease>, EngineError> {
        let path = dir.join(format!("{}.lock", issue_slug(issue_id, 80)));
        let lease_err = |source| EngineError::Lease {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(lease_err)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lease_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Lease {
                file,
                path: path.clone(),
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock || is_contended(&err) => Ok(None),
            Err(err) => Err(lease_err(err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let first = Lease::try_acquire(dir.path(), "bd-1").unwrap();
        assert!(first.is_some());
        assert!(Lease::try_acquire(dir.path(), "bd-1").unwrap().is_none());

        drop(first);
        assert!(Lease::try_acquire(dir.path(), "bd-1").unwrap().is_some());
    }

    #[test]
    fn test_leases_are_per_issue() {
        let dir = tempfile::tempdir().unwrap();
        let _a = Lease::try_acquire(dir.path(), "bd-1").unwrap().unwrap();
        let b = Lease::try_acquire(dir.path(), "bd-2").unwrap().unwrap();
        assert!(b.path().ends_with("bd-2.lock"));
    }

    #[test]
    fn test_lease_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join(".conveyor").join("leases");
        assert!(Lease::try_acquire(&nested, "bd-1").unwrap().is_some());
        assert!(nested.exists());
    }
}
