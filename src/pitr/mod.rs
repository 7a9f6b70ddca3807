//! Continuous point-in-time-recovery support.
//!
//! The PITR loop and the backup coordinator share two pieces of in-process
//! state: the [`PitrIntent`] flag, which pauses slicing without taking a
//! lock, and the [`PitrWaker`], which lets the coordinator cut the loop's
//! tick short after it has cleared the PITR lock.

mod intent;
mod slicer;
mod waker;

pub use intent::{Intent, IntentGuard, PitrIntent};
pub use slicer::{PitrSlicer, Tick};
pub use waker::PitrWaker;

use std::sync::Arc;

/// The state a coordinator and a PITR loop in the same process share.
#[derive(Debug, Clone, Default)]
pub struct PitrHandle {
    pub intent: Arc<PitrIntent>,
    pub waker: Arc<PitrWaker>,
}

impl PitrHandle {
    pub fn new() -> Self {
        Self::default()
    }
}
