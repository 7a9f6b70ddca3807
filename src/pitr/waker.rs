//! Wakeup signal for the PITR loop.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Lets the coordinator cut a PITR loop's tick short.
///
/// A wakeup sent while nobody waits is remembered until the next wait, so
/// the signal is never lost between two ticks. Waking with no loop running
/// is harmless.
#[derive(Debug, Default)]
pub struct PitrWaker {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl PitrWaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *pending = true;
        self.cond.notify_all();
    }

    /// Wait for a wakeup or until `timeout` passes. Returns whether a wakeup
    /// was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let (mut pending, _) = self
            .cond
            .wait_timeout_while(pending, timeout, |woken| !*woken)
            .unwrap_or_else(|poison| poison.into_inner());
        std::mem::take(&mut *pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_wakeup() {
        let waker = PitrWaker::new();
        assert!(!waker.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wakeup_before_wait_is_remembered_once() {
        let waker = PitrWaker::new();
        waker.wake();
        assert!(waker.wait_timeout(Duration::from_millis(10)));
        assert!(!waker.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wakeup_cuts_wait_short() {
        let waker = Arc::new(PitrWaker::new());
        let remote = Arc::clone(&waker);
        let start = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.wake();
        });

        assert!(waker.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
