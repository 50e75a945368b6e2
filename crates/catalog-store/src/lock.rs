//! Directory-based mutual exclusion.
//!
//! Exclusive creation of a directory is the test-and-set primitive: the
//! caller that creates it holds the lock, removing it releases the lock.

use catalog_backend::{Backend, BackendError};
use tracing::{debug, warn};

use crate::error::{CatalogError, CatalogResult};

/// A lock represented by the existence of a directory at `path`.
pub struct DirLock<'a> {
    backend: &'a dyn Backend,
    path: String,
}

impl<'a> DirLock<'a> {
    pub fn new(backend: &'a dyn Backend, path: impl Into<String>) -> Self {
        Self {
            backend,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_locked(&self) -> CatalogResult<bool> {
        Ok(self.backend.exists(&self.path)?)
    }

    /// Take the lock, failing with `ResourceLocked` if someone holds it.
    pub fn acquire(&self) -> CatalogResult<()> {
        if !self.backend.atomic_create() {
            warn!(path = %self.path, "backend lacks atomic create, lock is best effort");
        }
        match self.backend.create_dir_exclusive(&self.path) {
            Ok(()) => {
                debug!(path = %self.path, "lock acquired");
                Ok(())
            }
            Err(BackendError::AlreadyExists(_)) => Err(CatalogError::ResourceLocked(self.path.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the lock. Fails with a not-found error if nobody holds it.
    pub fn release(&self) -> CatalogResult<()> {
        self.backend.remove_recursive(&self.path)?;
        debug!(path = %self.path, "lock released");
        Ok(())
    }

    /// Acquire and return a guard that releases on drop.
    pub fn guard(&self) -> CatalogResult<DirLockGuard<'_, 'a>> {
        self.acquire()?;
        Ok(DirLockGuard {
            lock: self,
            released: false,
        })
    }

    /// Run `f` while holding the lock.
    ///
    /// An error from `f` wins over a failure to release; the latter is only
    /// logged in that case.
    pub fn with<T>(&self, f: impl FnOnce() -> CatalogResult<T>) -> CatalogResult<T> {
        let guard = self.guard()?;
        match f() {
            Ok(value) => {
                guard.release()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(release_err) = guard.release() {
                    warn!(path = %self.path, error = %release_err, "failed to release lock");
                }
                Err(e)
            }
        }
    }
}

/// Scoped holder of a [`DirLock`].
pub struct DirLockGuard<'l, 'a> {
    lock: &'l DirLock<'a>,
    released: bool,
}

impl DirLockGuard<'_, '_> {
    pub fn release(mut self) -> CatalogResult<()> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for DirLockGuard<'_, '_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.release() {
            warn!(path = %self.lock.path, error = %e, "failed to release lock on drop");
        }
    }
}
