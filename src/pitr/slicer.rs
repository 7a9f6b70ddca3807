//! The PITR slicing loop.

use super::{Intent, PitrHandle};
use crate::locks::{LockError, LockHeader, LockHeartbeat, LockStore, OperationType};
use crate::log::AgentLog;
use crate::node::Node;
use crate::runner::{CancelToken, SliceRunner};
use std::sync::Arc;
use std::time::Duration;

const OP: OperationType = OperationType::Pitr;

/// Outcome of one loop round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A backup intent is set; nothing was attempted.
    Paused,
    /// A peer holds a conflicting lock.
    Busy,
    /// A slice was persisted.
    Sliced,
    /// The slice was stopped before it finished.
    Interrupted,
    Failed,
}

/// Periodically persists PITR slices under the replica set's PITR lock.
pub struct PitrSlicer {
    node: Arc<dyn Node>,
    locks: Arc<dyn LockStore>,
    runner: Arc<dyn SliceRunner>,
    log: Arc<AgentLog>,
    shared: PitrHandle,
    check_period: Duration,
    heartbeat: Duration,
    stop: CancelToken,
}

impl PitrSlicer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: Arc<dyn Node>,
        locks: Arc<dyn LockStore>,
        runner: Arc<dyn SliceRunner>,
        log: Arc<AgentLog>,
        shared: PitrHandle,
        check_period: Duration,
        heartbeat: Duration,
    ) -> Self {
        Self {
            node,
            locks,
            runner,
            log,
            shared,
            check_period,
            heartbeat,
            stop: CancelToken::new(),
        }
    }

    /// Token that ends [`PitrSlicer::run`]; wake the loop after cancelling it.
    pub fn stop_token(&self) -> CancelToken {
        self.stop.clone()
    }

    /// Run rounds every check period, or sooner when woken, until stopped.
    pub fn run(&self) {
        self.log.info(OP, "", "pitr slicing started");
        while !self.stop.is_cancelled() {
            self.tick();
            self.shared.waker.wait_timeout(self.check_period);
        }
        self.log.info(OP, "", "pitr slicing stopped");
    }

    /// One round of the loop.
    pub fn tick(&self) -> Tick {
        if self.shared.intent.get() == Intent::Backup {
            self.log.debug(OP, "", "backup intent is set, skipping round");
            return Tick::Paused;
        }

        let info = match self.node.info() {
            Ok(info) => info,
            Err(e) => {
                self.log.error(OP, "", format_args!("get node info: {}", e));
                return Tick::Failed;
            }
        };

        let header = LockHeader::pitr(&info.set_name, &info.me);
        match self.locks.acquire(&header) {
            Ok(true) => {}
            Ok(false) => return Tick::Busy,
            Err(LockError::WasStale(stale)) => {
                self.log
                    .warning(OP, "", format_args!("cleared stale lock {}", stale));
                return Tick::Busy;
            }
            Err(e) => {
                self.log.error(OP, "", format_args!("acquiring lock: {}", e));
                return Tick::Failed;
            }
        }

        // A backup may have announced itself between the check and the acquire.
        let outcome = if self.shared.intent.get() == Intent::Backup {
            Tick::Paused
        } else {
            // Stopped with the loop, or by the heartbeat when a backup
            // force-releases the lock mid-slice.
            let slice = self.stop.child();
            let heartbeat = LockHeartbeat::start_cancelling(
                Arc::clone(&self.locks),
                header.clone(),
                self.heartbeat,
                slice.clone(),
            );
            let result = self.runner.run(&info, &slice);
            drop(heartbeat);

            match result {
                Ok(()) => {
                    self.log.debug(OP, "", "slice persisted");
                    Tick::Sliced
                }
                Err(e) if e.is_cancelled() => {
                    if self.stop.is_cancelled() {
                        self.log.info(OP, "", "slice interrupted");
                    } else {
                        self.log
                            .warning(OP, "", "slice interrupted, pitr lock was taken away");
                    }
                    Tick::Interrupted
                }
                Err(e) => {
                    self.log.error(OP, "", format_args!("slice: {}", e));
                    Tick::Failed
                }
            }
        };

        match self.locks.release(&header) {
            Ok(()) => {}
            Err(e @ (LockError::NotHeld(_) | LockError::NotOwner { .. })) => {
                self.log
                    .warning(OP, "", format_args!("pitr lock was taken away: {}", e));
            }
            Err(e) => {
                self.log
                    .error(OP, "", format_args!("unable to release pitr lock: {}", e));
            }
        }

        outcome
    }
}
