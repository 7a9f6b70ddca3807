//! Distributed locking for backup, restore and PITR operations.
//!
//! Every replica set member reaches the same [`LockStore`]. A lock is named
//! by a [`LockHeader`]; backup and restore locks are scoped by operation name
//! so different named operations never contend with each other, only with
//! the replica set's PITR lock and with same-named peers.
//!
//! # Lock Files
//!
//! [`FileLockStore`] keeps one JSON file per lock under a shared directory:
//! - `header`: the header the lock was acquired with
//! - `owner`: the process owner (e.g., `user@HOST`)
//! - `pid`: the process ID (optional)
//! - `created_at` / `heartbeat`: RFC3339 timestamps
//!
//! A lock whose heartbeat is older than the stale threshold is abandoned;
//! the next acquisition clears it and reports [`LockError::WasStale`].

mod file_store;
mod guard;
mod heartbeat;
mod metadata;
mod store;
mod types;


// Re-export public API
pub use file_store::FileLockStore;
pub use guard::LockGuard;
pub use heartbeat::LockHeartbeat;
pub use metadata::LockMetadata;
pub use store::{LockError, LockStore};
pub use types::{LockHeader, LockInfo, OperationType};
