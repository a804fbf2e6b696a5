//! Singleton job lock
//!
//! A job holds `<lock_dir>/<job>.lock` for its whole run. The file is
//! created exclusively with mode 0600 and holds the owner's process id.
//! Dropping the guard unlinks it, so every exit path that unwinds the
//! stack releases the lock.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use yoda_common::{Error, Result};

/// Lock name of the replication batch job
pub const REPLICATION_JOB: &str = "irods-replicate";

/// Lock name of the revision cleanup batch job
pub const CLEANUP_JOB: &str = "irods-revision-cleanup";

/// Exclusive lock held for the duration of a job run
#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
}

impl JobLock {
    /// Path of the lock file for `job`
    pub fn lock_path(dir: impl AsRef<Path>, job: &str) -> PathBuf {
        dir.as_ref().join(format!("{job}.lock"))
    }

    /// Take the lock for `job`, failing with `LockContention` when it is held
    pub fn acquire(dir: impl AsRef<Path>, job: &str) -> Result<Self> {
        let path = Self::lock_path(dir, job);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = match options.open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::LockContention { path });
            }
            Err(e) => return Err(e.into()),
        };

        // From here on the guard owns the file, so a failed write still unlinks it
        let lock = Self { path };
        write!(file, "{}", std::process::id())?;
        file.flush()?;
        debug!(path = %lock.path.display(), "Job lock acquired");
        Ok(lock)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail unless this is the lock of `job` in `dir`
    pub fn ensure_guards(&self, dir: impl AsRef<Path>, job: &str) -> Result<()> {
        let expected = Self::lock_path(dir, job);
        if self.path == expected {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "{} does not guard {job} (expected {})",
                self.path.display(),
                expected.display()
            )))
        }
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Job lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove job lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_pid_and_releases() {
        let dir = TempDir::new().unwrap();
        let path = JobLock::lock_path(dir.path(), REPLICATION_JOB);
        {
            let lock = JobLock::acquire(dir.path(), REPLICATION_JOB).unwrap();
            assert_eq!(lock.path(), path);
            let contents = std::fs::read_to_string(&path).unwrap();
            assert_eq!(contents, std::process::id().to_string());
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let lock = JobLock::acquire(dir.path(), CLEANUP_JOB).unwrap();
        let mode = std::fs::metadata(lock.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = TempDir::new().unwrap();
        let _held = JobLock::acquire(dir.path(), REPLICATION_JOB).unwrap();
        let err = JobLock::acquire(dir.path(), REPLICATION_JOB).unwrap_err();
        assert!(matches!(err, Error::LockContention { .. }));
        // The refused attempt must not unlink the holder's file
        assert!(JobLock::lock_path(dir.path(), REPLICATION_JOB).exists());
    }

    #[test]
    fn test_ensure_guards_matches_job() {
        let dir = TempDir::new().unwrap();
        let lock = JobLock::acquire(dir.path(), REPLICATION_JOB).unwrap();
        lock.ensure_guards(dir.path(), REPLICATION_JOB).unwrap();
        assert!(matches!(
            lock.ensure_guards(dir.path(), CLEANUP_JOB),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_jobs_lock_independently() {
        let dir = TempDir::new().unwrap();
        let _a = JobLock::acquire(dir.path(), REPLICATION_JOB).unwrap();
        let _b = JobLock::acquire(dir.path(), CLEANUP_JOB).unwrap();
    }
}
