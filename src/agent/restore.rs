//! Restore lifecycle.

use super::{Agent, RestoreCommand};
use crate::locks::{LockError, LockGuard, LockHeader, LockHeartbeat, OperationType};
use std::sync::Arc;

const OP: OperationType = OperationType::Restore;

impl Agent {
    /// Run the restore lifecycle for `cmd`.
    ///
    /// Only the primary restores. Restores are not dispatched to racing
    /// members, so losing the lock is logged as an error. Entries are keyed
    /// by the backup being restored.
    pub fn restore(&self, cmd: &RestoreCommand) {
        let key = cmd.backup_name.as_str();

        let info = match self.node.info() {
            Ok(info) => info,
            Err(e) => {
                self.log.error(OP, key, format_args!("get node info: {}", e));
                return;
            }
        };
        if !info.is_primary() {
            self.log.info(OP, key, "node is not suitable for restore");
            return;
        }

        let header = LockHeader::restore(&info.set_name, &info.me, &cmd.name);
        match self.locks.acquire(&header) {
            Ok(true) => {}
            Ok(false) => {
                self.log.error(
                    OP,
                    key,
                    "unable to run the restore while another backup or restore process running",
                );
                return;
            }
            Err(e @ LockError::WasStale(_)) => {
                self.log.error(
                    OP,
                    key,
                    format_args!("acquiring lock: {}, retry the restore", e),
                );
                return;
            }
            Err(e) => {
                self.log.error(OP, key, format_args!("acquiring lock: {}", e));
                return;
            }
        }

        let lock = LockGuard::new(Arc::clone(&self.locks), header);
        let heartbeat = LockHeartbeat::start(
            Arc::clone(&self.locks),
            lock.header().clone(),
            self.timing.lock_heartbeat,
        );

        self.log.info(OP, key, "restore started");
        match self.runners.restore.run(cmd, &info) {
            Ok(()) => self.log.info(OP, key, "restore finished successfully"),
            Err(e) => self.log.error(OP, key, format_args!("restore: {}", e)),
        }

        drop(heartbeat);
        if let Err(e) = lock.release() {
            self.log.error(OP, key, format_args!("release lock: {}", e));
        }
    }
}
