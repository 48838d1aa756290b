//! Project-scoped migration lock.
//!
//! # Responsibility
//! - Serialize migration runs that target the same project root.
//! - Remove the lock artifact once the protected region ends.
//!
//! # Invariants
//! - Acquisition blocks until the lock is free; there is no timeout.
//! - The lock file is removed while the lock is still held, then unlocked.
//! - A holder never keeps a lock on a file that is no longer linked at the
//!   lock path; such acquisitions are retried on a fresh file.

use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Reserved lock file name inside the project root.
pub const MIGRATION_LOCK_FILE_NAME: &str = ".FLOW_PROJECT_MIGRATION_LOCK";

/// Failure to create or lock the lock file.
#[derive(Debug)]
pub struct LockError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to acquire migration lock `{}`: {}",
            self.path.display(),
            self.source
        )
    }
}

impl Error for LockError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Held exclusive migration lock; released when dropped.
#[derive(Debug)]
pub struct MigrationLock {
    path: PathBuf,
    file: Option<File>,
}

impl MigrationLock {
    /// Blocks until the migration lock of the project at `root` is held.
    pub fn acquire(root: &Path) -> Result<Self, LockError> {
        let path = root.join(MIGRATION_LOCK_FILE_NAME);
        let started_at = Instant::now();
        debug!(
            "event=migration_lock module=lock status=start path={}",
            path.display()
        );

        let lock_err = |source| LockError {
            path: path.clone(),
            source,
        };

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(lock_err)?;
            file.lock().map_err(lock_err)?;

            if is_linked_at(&file, &path).map_err(lock_err)? {
                info!(
                    "event=migration_lock module=lock status=ok path={} waited_ms={}",
                    path.display(),
                    started_at.elapsed().as_millis()
                );
                return Ok(Self {
                    path,
                    file: Some(file),
                });
            }

            debug!(
                "event=migration_lock module=lock status=retry path={} reason=lock_file_replaced",
                path.display()
            );
        }
    }

    /// Location of the lock artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            // Another cleanup got there first.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                "event=migration_lock module=lock status=warn path={} error_code=lock_cleanup_failed error={}",
                self.path.display(),
                err
            ),
        }

        if let Some(file) = self.file.take() {
            if let Err(err) = file.unlock() {
                warn!(
                    "event=migration_lock module=lock status=warn path={} error_code=unlock_failed error={}",
                    self.path.display(),
                    err
                );
            }
        }
        debug!(
            "event=migration_lock module=lock status=released path={}",
            self.path.display()
        );
    }
}

/// Runs `body` while holding the migration lock of the project at `root`.
///
/// The lock is released on every exit path of `body`, including unwinding.
pub fn with_lock<T>(root: &Path, body: impl FnOnce() -> T) -> Result<T, LockError> {
    let _guard = MigrationLock::acquire(root)?;
    Ok(body())
}

#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(linked) => Ok(held.dev() == linked.dev() && held.ino() == linked.ino()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> io::Result<bool> {
    path.try_exists()
}
