//! Resource lock held while background scanning is allowed to run.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::CoreError;

/// Exclusive token keeping the host awake while scanning (wake-lock analogue).
pub trait ResourceLock: Send + Sync {
    fn acquire(&self) -> Result<(), CoreError>;
    fn release(&self) -> Result<(), CoreError>;
}

/// Idempotent wrapper around a [`ResourceLock`].
///
/// Repeated `acquire`/`release` calls never reach the backend twice in a row,
/// and a held lock is released when the guard is dropped.
pub struct PowerGuard {
    lock: Arc<dyn ResourceLock>,
    held: bool,
}

impl PowerGuard {
    pub fn new(lock: Arc<dyn ResourceLock>) -> Self {
        Self { lock, held: false }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Returns `true` if the lock was taken by this call.
    pub fn acquire(&mut self) -> bool {
        if self.held {
            return false;
        }
        match self.lock.acquire() {
            Ok(()) => {
                self.held = true;
                debug!("Resource lock acquired");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to acquire resource lock");
                false
            }
        }
    }

    /// Returns `true` if the lock was given back by this call.
    pub fn release(&mut self) -> bool {
        if !self.held {
            return false;
        }
        self.held = false;
        if let Err(e) = self.lock.release() {
            warn!(error = %e, "Failed to release resource lock");
        } else {
            debug!("Resource lock released");
        }
        true
    }
}

impl Drop for PowerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingLock {
        calls: Mutex<Vec<&'static str>>,
        fail_acquire: bool,
    }

    impl ResourceLock for CountingLock {
        fn acquire(&self) -> Result<(), CoreError> {
            self.calls.lock().push("acquire");
            if self.fail_acquire {
                return Err(CoreError::Lock("unavailable".into()));
            }
            Ok(())
        }

        fn release(&self) -> Result<(), CoreError> {
            self.calls.lock().push("release");
            Ok(())
        }
    }

    #[test]
    fn test_acquire_release_idempotent() {
        let lock = Arc::new(CountingLock::default());
        let mut guard = PowerGuard::new(lock.clone());

        assert!(guard.acquire());
        assert!(!guard.acquire());
        assert!(guard.is_held());

        assert!(guard.release());
        assert!(!guard.release());
        assert!(!guard.is_held());

        assert_eq!(*lock.calls.lock(), vec!["acquire", "release"]);
    }

    #[test]
    fn test_failed_acquire_not_held() {
        let lock = Arc::new(CountingLock {
            fail_acquire: true,
            ..Default::default()
        });
        let mut guard = PowerGuard::new(lock.clone());

        assert!(!guard.acquire());
        assert!(!guard.is_held());
        assert!(!guard.release());
        assert_eq!(*lock.calls.lock(), vec!["acquire"]);
    }

    #[test]
    fn test_drop_releases_held_lock() {
        let lock = Arc::new(CountingLock::default());
        {
            let mut guard = PowerGuard::new(lock.clone());
            guard.acquire();
        }
        assert_eq!(*lock.calls.lock(), vec!["acquire", "release"]);
    }
}
