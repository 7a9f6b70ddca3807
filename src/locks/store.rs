//! The lock store contract consumed by the coordinator.

use super::types::{LockHeader, LockInfo};
use thiserror::Error;

/// Failures reported by a [`LockStore`].
///
/// Lost contention is not an error: [`LockStore::acquire`] reports it as
/// `Ok(false)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Acquisition ran into an abandoned lock and cleared it. Carries the
    /// header of the removed lock; the caller may retry.
    #[error("cleared stale lock {0}")]
    WasStale(LockHeader),

    /// Release was asked for a lock that does not exist.
    #[error("lock {0} is not held")]
    NotHeld(LockHeader),

    /// Release was asked by a node that does not hold the lock.
    #[error("lock {requested} is held by {holder}")]
    NotOwner {
        requested: LockHeader,
        holder: String,
    },

    /// The backing store failed.
    #[error("{0}")]
    Store(String),
}

/// A named, typed exclusive lock shared by every replica set member.
///
/// Implementations provide best-effort atomicity only. Staleness detection
/// (lease or heartbeat expiry) is their responsibility.
pub trait LockStore: Send + Sync {
    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(true)` when this caller now owns the lock and `Ok(false)`
    /// when a live peer holds a conflicting lock.
    fn acquire(&self, header: &LockHeader) -> Result<bool, LockError>;

    /// Release a lock previously acquired with the same header.
    fn release(&self, header: &LockHeader) -> Result<(), LockError>;

    /// Forcibly invalidate the lock regardless of its holder.
    ///
    /// A missing lock is not an error.
    fn mark_stale(&self, header: &LockHeader) -> Result<(), LockError>;

    /// Prove the holder is still alive.
    ///
    /// Fails with `NotHeld` or `NotOwner` once the lock has been cleared or
    /// taken over; the lock is never recreated.
    fn refresh(&self, header: &LockHeader) -> Result<(), LockError>;

    /// List every lock currently present.
    fn list(&self) -> Result<Vec<LockInfo>, LockError>;
}
