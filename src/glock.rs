//! Advisory inter-process locks for grammar compilation.
//!
//! A [`GlobalLock`] is a file under the OS temp directory, created with
//! `O_CREAT | O_EXCL` semantics so that exactly one process can hold a
//! given lock name at a time. The lock is held only while compiling or
//! persisting a grammar; it is released on drop. After a crash, the file
//! can linger — recovery is documented and deliberate: delete the file
//! shown in the error message and retry.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use crate::error::LockError;

/// An exclusively held advisory lock file.
///
/// ```no_run
/// use greinir::glock::GlobalLock;
///
/// let lock = GlobalLock::acquire("greynir-grammar")?;
/// // ... compile the grammar ...
/// drop(lock);
/// # Ok::<(), greinir::error::LockError>(())
/// ```
#[derive(Debug)]
pub struct GlobalLock {
    path: PathBuf,
}

impl GlobalLock {
    /// The lock file path for a given lock name.
    pub fn path_for(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{name}.lock"))
    }

    /// Try to acquire the named lock. Fails with [`LockError::Held`] if the
    /// lock file already exists.
    pub fn acquire(name: &str) -> Result<Self, LockError> {
        let path = Self::path_for(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                tracing::debug!(path = %path.display(), "lock acquired");
                Ok(GlobalLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(LockError::Held {
                name: name.to_string(),
                path: path.display().to_string(),
            }),
            Err(e) => Err(LockError::Io { source: e }),
        }
    }

    /// The lock file's path.
    pub fn lock_path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for GlobalLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_acquire_and_release() {
        let name = format!("greinir-test-{}", std::process::id());
        let lock = GlobalLock::acquire(&name).unwrap();
        // Second acquisition fails while held
        assert!(matches!(
            GlobalLock::acquire(&name),
            Err(LockError::Held { .. })
        ));
        drop(lock);
        // Released: can acquire again
        let lock2 = GlobalLock::acquire(&name).unwrap();
        drop(lock2);
    }

    #[test]
    fn stale_lock_recovery_by_deletion() {
        let name = format!("greinir-stale-{}", std::process::id());
        let lock = GlobalLock::acquire(&name).unwrap();
        let path = lock.lock_path().to_path_buf();
        std::mem::forget(lock); // Simulate a crash: file stays behind
        assert!(matches!(
            GlobalLock::acquire(&name),
            Err(LockError::Held { .. })
        ));
        fs::remove_file(&path).unwrap(); // Manual recovery
        let lock2 = GlobalLock::acquire(&name).unwrap();
        drop(lock2);
    }
}
