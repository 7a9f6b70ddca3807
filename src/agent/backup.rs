//! Backup lifecycle.

use super::{Agent, BackupCommand, CurrentBackup, acquire_lock};
use crate::locks::{LockGuard, LockHeader, LockHeartbeat, OperationType};
use crate::pitr::Intent;
use crate::runner::CancelToken;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const OP: OperationType = OperationType::Backup;

/// Clears the CurrentBackup slot when the runner is done with it.
struct Published<'a> {
    agent: &'a Agent,
    cancel: CancelToken,
}

impl Drop for Published<'_> {
    fn drop(&mut self) {
        *self.agent.slot() = None;
    }
}

impl Agent {
    /// Run the backup lifecycle for `cmd`.
    ///
    /// Returns once the backup has finished on this node, or as soon as it is
    /// clear that it will run elsewhere or not at all.
    pub fn backup(&self, cmd: &BackupCommand) {
        let name = cmd.name.as_str();

        match self.node.suits_backup() {
            Ok(true) => {}
            Ok(false) => {
                self.log.info(OP, name, "node is not suitable for backup");
                return;
            }
            Err(e) => {
                self.log.error(OP, name, format_args!("node check: {}", e));
                return;
            }
        }

        let info = match self.node.info() {
            Ok(info) => info,
            Err(e) => {
                self.log.error(OP, name, format_args!("get node info: {}", e));
                return;
            }
        };

        // Keep the local PITR loop from taking its lock, give it one full
        // poll to notice, then clear whatever PITR lock is already held.
        let _intent = self.pitr.intent.hold(Intent::Backup);
        thread::sleep(self.timing.pitr_check_period * 11 / 10);

        if let Err(e) = self
            .locks
            .mark_stale(&LockHeader::pitr(&info.set_name, &info.me))
        {
            self.log
                .warning(OP, name, format_args!("clearing pitr locks: {}", e));
        }
        self.pitr.waker.wake();

        let header = LockHeader::backup(&info.set_name, &info.me, name);
        let acquired = acquire_lock(self.locks.as_ref(), &header, |stale| {
            self.log.warning(
                OP,
                name,
                format_args!("lock {} was abandoned and marked stale", stale),
            );
        });
        match acquired {
            Ok(true) => {}
            Ok(false) => {
                self.log
                    .info(OP, name, "backup has been scheduled on another replset node");
                return;
            }
            Err(e) => {
                self.log.error(OP, name, format_args!("acquiring lock: {}", e));
                return;
            }
        }

        let lock = LockGuard::new(Arc::clone(&self.locks), header.clone());
        let heartbeat = LockHeartbeat::start(
            Arc::clone(&self.locks),
            header.clone(),
            self.timing.lock_heartbeat,
        );

        match self.publish(cmd) {
            Some(published) => {
                self.log.info(OP, name, "backup started");
                let start = Instant::now();
                let result = self.runners.backup.run(cmd, &info, &published.cancel);
                drop(published);

                match result {
                    Ok(()) => self.log.info(OP, name, "backup finished"),
                    Err(e) if e.is_cancelled() => self.log.info(OP, name, "backup was canceled"),
                    Err(e) => self.log.error(OP, name, format_args!("backup: {}", e)),
                }

                // Peers that lost the race retry after 0.9 × wait_backup_start;
                // releasing sooner lets one of them run the same backup again.
                if let Some(remaining) = self.timing.wait_backup_start.checked_sub(start.elapsed())
                {
                    thread::sleep(remaining);
                }
            }
            None => {
                self.log.error(
                    OP,
                    name,
                    "another backup is already running in this process",
                );
            }
        }

        drop(heartbeat);
        if let Err(e) = lock.release() {
            self.log.error(
                OP,
                name,
                format_args!("unable to release backup lock {}: {}", header, e),
            );
        }
    }

    /// Publish `cmd` as the CurrentBackup. Fails if the slot is taken.
    fn publish(&self, cmd: &BackupCommand) -> Option<Published<'_>> {
        let mut slot = self.slot();
        if slot.is_some() {
            return None;
        }

        let cancel = CancelToken::new();
        *slot = Some(CurrentBackup {
            cmd: cmd.clone(),
            cancel: cancel.clone(),
        });
        Some(Published {
            agent: self,
            cancel,
        })
    }
}
