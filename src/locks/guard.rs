//! Release-once lock guard.

use super::store::{LockError, LockStore};
use super::types::LockHeader;
use std::sync::Arc;

/// Guard for an acquired lock.
///
/// The lock is released at most once: either through [`LockGuard::release`],
/// which hands the error back to the caller, or on drop, where a failure is
/// only reported through `tracing`.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    header: LockHeader,

    /// Whether the lock has been released manually.
    released: bool,
}

impl LockGuard {
    /// Wrap a lock that `store` has just granted for `header`.
    pub fn new(store: Arc<dyn LockStore>, header: LockHeader) -> Self {
        Self {
            store,
            header,
            released: false,
        }
    }

    pub fn header(&self) -> &LockHeader {
        &self.header
    }

    /// Release the lock now and report the outcome.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.store.release(&self.header)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.store.release(&self.header)
        {
            tracing::warn!(lock = %self.header, error = %e, "failed to release lock");
        }
    }
}
