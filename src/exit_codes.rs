//! Exit code constants for the replset-agent CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 3: Node lookup failure
//! - 4: Lock store failure
//! - 5: Runner failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unreadable or invalid config.
pub const USER_ERROR: i32 = 1;

/// Node identity or role could not be determined.
pub const NODE_FAILURE: i32 = 3;

/// The lock store could not be read or written.
pub const LOCK_FAILURE: i32 = 4;

/// A backup, restore or slice runner could not be started.
pub const RUNNER_FAILURE: i32 = 5;
