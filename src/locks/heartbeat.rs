//! Background refresh of a held lock.

use super::store::{LockError, LockStore};
use super::types::LockHeader;
use crate::runner::CancelToken;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Keeps a lock fresh until dropped.
///
/// Peers treat a lock whose heartbeat is older than the store's stale
/// threshold as abandoned, so every long-running holder needs one of these.
pub struct LockHeartbeat {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LockHeartbeat {
    /// Start refreshing `header` every `interval`.
    pub fn start(store: Arc<dyn LockStore>, header: LockHeader, interval: Duration) -> Self {
        Self::spawn(store, header, interval, None)
    }

    /// Like [`LockHeartbeat::start`], and cancels `lost` once the lock turns
    /// out to have been removed or taken over.
    pub fn start_cancelling(
        store: Arc<dyn LockStore>,
        header: LockHeader,
        interval: Duration,
        lost: CancelToken,
    ) -> Self {
        Self::spawn(store, header, interval, Some(lost))
    }

    fn spawn(
        store: Arc<dyn LockStore>,
        header: LockHeader,
        interval: Duration,
        lost: Option<CancelToken>,
    ) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(format!("heartbeat-{}", header.op))
            .spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    match store.refresh(&header) {
                        Ok(()) => {}
                        Err(e @ (LockError::NotHeld(_) | LockError::NotOwner { .. })) => {
                            tracing::warn!(
                                lock = %header,
                                error = %e,
                                "lock was taken away, heartbeat stopped"
                            );
                            if let Some(lost) = &lost {
                                lost.cancel();
                            }
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(lock = %header, error = %e, "lock heartbeat failed");
                        }
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "failed to start lock heartbeat");
                None
            }
        };

        Self {
            stop: Some(stop),
            handle,
        }
    }
}

impl Drop for LockHeartbeat {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel and ends the loop.
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
