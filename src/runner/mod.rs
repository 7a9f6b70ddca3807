//! Backup, restore and PITR slice runners.
//!
//! The coordinator only sequences runners; the data transfer itself happens
//! behind these traits. Cancellation is cooperative: a runner polls its
//! [`CancelToken`] and returns [`RunError::Cancelled`] once it has stopped.

mod command;
pub mod template;

pub use command::CommandRunner;

use crate::agent::{BackupCommand, RestoreCommand};
use crate::node::NodeInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Outcome of a failed runner invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The operator asked for the operation to stop.
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl RunError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }
}

/// Cooperative cancellation handle shared between a requester and a runner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` only for the call that flipped
    /// the token.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    /// A token that is also cancelled whenever `self` is. Cancelling the
    /// child leaves `self` untouched.
    pub fn child(&self) -> Self {
        Self {
            cancelled: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }
}

/// Performs a full backup.
pub trait BackupRunner: Send + Sync {
    fn run(&self, cmd: &BackupCommand, node: &NodeInfo, cancel: &CancelToken)
    -> Result<(), RunError>;
}

/// Restores a named backup. Restores are not cancellable.
pub trait RestoreRunner: Send + Sync {
    fn run(&self, cmd: &RestoreCommand, node: &NodeInfo) -> Result<(), RunError>;
}

/// Persists one incremental PITR slice.
pub trait SliceRunner: Send + Sync {
    fn run(&self, node: &NodeInfo, stop: &CancelToken) -> Result<(), RunError>;
}
