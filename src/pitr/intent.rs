//! Process-wide PITR intent flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// What the agent intends to do that the PITR loop must make way for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    None,
    Backup,
}

impl Intent {
    fn as_u8(self) -> u8 {
        match self {
            Intent::None => 0,
            Intent::Backup => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Intent::Backup,
            _ => Intent::None,
        }
    }
}

/// Lock-free intent flag shared by the coordinator and the PITR loop.
///
/// The loop polls it; staleness of a read is bounded by the loop's check
/// period, which is why the coordinator waits `1.1 × period` after setting it.
#[derive(Debug, Default)]
pub struct PitrIntent {
    state: AtomicU8,
}

impl PitrIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Intent {
        Intent::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, intent: Intent) {
        self.state.store(intent.as_u8(), Ordering::Release);
    }

    /// Set `intent` until the returned guard is dropped, which resets it to
    /// [`Intent::None`] on every exit path, unwinding included.
    pub fn hold(self: &Arc<Self>, intent: Intent) -> IntentGuard {
        self.set(intent);
        IntentGuard {
            flag: Arc::clone(self),
        }
    }
}

/// Resets the intent flag on drop.
#[derive(Debug)]
pub struct IntentGuard {
    flag: Arc<PitrIntent>,
}

impl Drop for IntentGuard {
    fn drop(&mut self) {
        self.flag.set(Intent::None);
    }
}
