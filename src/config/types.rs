//! Configuration sections and their defaults.

use crate::node::MemberState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Identity and role of the local node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Replica set name.
    pub replset: String,

    /// This member's address.
    pub me: String,

    pub state: MemberState,
    pub delay_secs: u64,

    /// YAML file with `state`/`delay_secs`, re-read on every lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            replset: default_replset(),
            me: default_me(),
            state: MemberState::default(),
            delay_secs: 0,
            state_file: None,
        }
    }
}

/// Shared lock store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Directory reachable by every replica set member.
    pub dir: PathBuf,

    /// Seconds without a heartbeat after which a lock is abandoned.
    pub stale_secs: u64,

    /// Seconds between heartbeats of a held lock.
    pub heartbeat_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("locks"),
            stale_secs: default_stale_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl LockConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Coordination timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Poll interval of the PITR slicing loop.
    pub pitr_check_period_ms: u64,

    /// How long peers that lost the backup lock race wait (×0.9) before
    /// retrying. The backup lock is held at least this long.
    pub wait_backup_start_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pitr_check_period_ms: default_pitr_check_period_ms(),
            wait_backup_start_ms: default_wait_backup_start_ms(),
        }
    }
}

impl TimingConfig {
    pub fn pitr_check_period(&self) -> Duration {
        Duration::from_millis(self.pitr_check_period_ms)
    }

    pub fn wait_backup_start(&self) -> Duration {
        Duration::from_millis(self.wait_backup_start_ms)
    }
}

/// Continuous PITR slicing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PitrConfig {
    pub enabled: bool,

    /// Slice command template (`{replset}`, `{node}`).
    pub slice_command: String,
}

// Default value functions for serde
pub(crate) fn default_replset() -> String {
    "rs0".to_string()
}
pub(crate) fn default_me() -> String {
    "localhost:27017".to_string()
}
pub(crate) fn default_stale_secs() -> u64 {
    30
}
pub(crate) fn default_heartbeat_secs() -> u64 {
    5
}
pub(crate) fn default_pitr_check_period_ms() -> u64 {
    15_000
}
pub(crate) fn default_wait_backup_start_ms() -> u64 {
    30_000
}
pub(crate) fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("agent-log.ndjson"))
}
