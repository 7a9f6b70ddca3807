//! Stale-aware lock acquisition.

use crate::locks::{LockError, LockHeader, LockStore};

/// Acquire `header`, retrying once if the store had to clear an abandoned
/// lock on the way.
///
/// `on_stale` sees the header of the lock that was cleared. A second
/// `WasStale` is returned to the caller unchanged.
pub fn acquire_lock<F>(
    store: &dyn LockStore,
    header: &LockHeader,
    on_stale: F,
) -> Result<bool, LockError>
where
    F: FnOnce(&LockHeader),
{
    match store.acquire(header) {
        Err(LockError::WasStale(stale)) => {
            on_stale(&stale);
            store.acquire(header)
        }
        other => other,
    }
}
