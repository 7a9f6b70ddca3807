//! Error types for the replset agent.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! The coordination core in [`crate::agent`] never returns these to its caller;
//! they surface from collaborators, config loading and the CLI.

use crate::exit_codes;
use crate::locks::LockError;
use thiserror::Error;

/// Main error type for agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid arguments or configuration.
    #[error("{0}")]
    Config(String),

    /// Node identity or role lookup failed.
    #[error("Node lookup failed: {0}")]
    Node(String),

    /// The lock store failed.
    #[error("Lock store failed: {0}")]
    Lock(#[from] LockError),

    /// A runner could not be prepared or spawned.
    #[error("Runner failed: {0}")]
    Runner(String),

    /// Filesystem or stream I/O outside the lock store.
    #[error("{0}")]
    Io(String),
}

impl AgentError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::Config(_) | AgentError::Io(_) => exit_codes::USER_ERROR,
            AgentError::Node(_) => exit_codes::NODE_FAILURE,
            AgentError::Lock(_) => exit_codes::LOCK_FAILURE,
            AgentError::Runner(_) => exit_codes::RUNNER_FAILURE,
        }
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
