//! Agent coordinator for replica set backups and restores.
//!
//! Every member of a replica set receives the same command at roughly the
//! same time. The coordinator makes sure a command runs on exactly one of
//! them:
//!
//! - **Backup**: eligibility check, PITR handshake, distributed lock, runner,
//!   then a dwell-time floor before the lock is released
//! - **Restore**: primary only, lock held for the whole run
//! - **CancelBackup**: cancels the in-flight backup, if any
//!
//! Nothing here returns an error to the caller. Commands are fire-and-forget
//! and every outcome ends up in the [`AgentLog`].
//!
//! # Timing
//!
//! Both waits in the backup path are heuristics. The PITR wait assumes the
//! slicing loop polls at `pitr_check_period`; the dwell floor assumes peers
//! that lost the lock race retry after `0.9 × wait_backup_start`. They narrow
//! the window for a duplicate backup without closing it.

mod acquire;
mod backup;
mod command;
mod restore;

#[cfg(test)]
mod tests;

pub use acquire::acquire_lock;
pub use command::{BackupCommand, RestoreCommand};

use crate::config::Config;
use crate::locks::{LockStore, OperationType};
use crate::log::AgentLog;
use crate::node::Node;
use crate::pitr::PitrHandle;
use crate::runner::{BackupRunner, CancelToken, RestoreRunner};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Timing the coordinator consumes but does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Poll interval of the PITR slicing loop.
    pub pitr_check_period: Duration,
    /// Peer retry backoff; the backup lock is held at least this long.
    pub wait_backup_start: Duration,
    /// Refresh interval for held locks.
    pub lock_heartbeat: Duration,
}

impl Timing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pitr_check_period: config.timing.pitr_check_period(),
            wait_backup_start: config.timing.wait_backup_start(),
            lock_heartbeat: config.locks.heartbeat(),
        }
    }
}

/// The backup running in this process.
#[derive(Debug)]
struct CurrentBackup {
    cmd: BackupCommand,
    cancel: CancelToken,
}

/// External runners the coordinator sequences.
#[derive(Clone)]
pub struct Runners {
    pub backup: Arc<dyn BackupRunner>,
    pub restore: Arc<dyn RestoreRunner>,
}

/// Per-process coordinator.
pub struct Agent {
    node: Arc<dyn Node>,
    locks: Arc<dyn LockStore>,
    runners: Runners,
    log: Arc<AgentLog>,
    timing: Timing,
    pitr: PitrHandle,
    current: Mutex<Option<CurrentBackup>>,
}

impl Agent {
    pub fn new(
        node: Arc<dyn Node>,
        locks: Arc<dyn LockStore>,
        runners: Runners,
        log: Arc<AgentLog>,
        timing: Timing,
    ) -> Self {
        Self {
            node,
            locks,
            runners,
            log,
            timing,
            pitr: PitrHandle::new(),
            current: Mutex::new(None),
        }
    }

    /// State to hand to a PITR slicing loop running in this process.
    pub fn pitr_handle(&self) -> PitrHandle {
        self.pitr.clone()
    }

    /// Name of the backup currently running in this process.
    pub fn current_backup(&self) -> Option<String> {
        self.slot().as_ref().map(|current| current.cmd.name.clone())
    }

    /// Cancel the backup running in this process.
    ///
    /// Returns `true` when this call is the one that cancelled it. With no
    /// backup running this does nothing.
    pub fn cancel_backup(&self) -> bool {
        let slot = self.slot();
        let Some(current) = slot.as_ref() else {
            return false;
        };

        let flipped = current.cancel.cancel();
        if flipped {
            self.log.info(
                OperationType::Backup,
                &current.cmd.name,
                "cancellation requested",
            );
        }
        flipped
    }

    fn slot(&self) -> MutexGuard<'_, Option<CurrentBackup>> {
        self.current
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
