//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one agent process.
///
/// This struct represents the contents of `agent.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and role of the node this agent runs next to.
    pub node: NodeConfig,

    /// Shared lock store settings.
    pub locks: LockConfig,

    /// Coordination timing, owned by the deployment rather than the agent.
    pub timing: TimingConfig,

    /// NDJSON agent log. `None` logs through tracing only.
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,

    /// Backup command template (`{name}`, `{replset}`, `{node}`).
    pub backup_command: String,

    /// Restore command template (`{name}`, `{backup}`, `{replset}`, `{node}`).
    pub restore_command: String,

    /// Working directory for runner commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_workdir: Option<PathBuf>,

    /// Continuous PITR slicing.
    pub pitr: PitrConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            locks: LockConfig::default(),
            timing: TimingConfig::default(),
            log_file: default_log_file(),
            backup_command: String::new(),
            restore_command: String::new(),
            runner_workdir: None,
            pitr: PitrConfig::default(),
        }
    }
}
