//! Node identity and role.
//!
//! The agent never talks to the database directly; it asks a [`Node`] who it
//! is, which replica set it belongs to, and what role it currently plays.

use crate::config::NodeConfig;
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Replica set member state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Primary,
    #[default]
    Secondary,
    Arbiter,
    /// Startup, recovering, rollback and other transient states.
    Other,
}

/// What a node knows about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Replica set name.
    pub set_name: String,
    /// This member's address, unique within the replica set.
    pub me: String,
    pub state: MemberState,
    /// Replication delay configured for this member.
    pub delay_secs: u64,
}

impl NodeInfo {
    pub fn primary(set_name: &str, me: &str) -> Self {
        Self::with_state(set_name, me, MemberState::Primary)
    }

    pub fn secondary(set_name: &str, me: &str) -> Self {
        Self::with_state(set_name, me, MemberState::Secondary)
    }

    pub fn with_state(set_name: &str, me: &str, state: MemberState) -> Self {
        Self {
            set_name: set_name.to_string(),
            me: me.to_string(),
            state,
            delay_secs: 0,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.state == MemberState::Primary
    }

    /// A member can take a backup when it holds data that is current:
    /// a primary or secondary without replication delay.
    pub fn suits_backup(&self) -> bool {
        matches!(self.state, MemberState::Primary | MemberState::Secondary) && self.delay_secs == 0
    }
}

/// Source of node identity and role.
pub trait Node: Send + Sync {
    fn info(&self) -> Result<NodeInfo>;

    /// Whether this node may run a backup right now.
    fn suits_backup(&self) -> Result<bool> {
        Ok(self.info()?.suits_backup())
    }
}

/// Role overrides read from `node.state_file`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct NodeStatus {
    state: MemberState,
    delay_secs: u64,
}

/// [`Node`] described by configuration.
///
/// When `state_file` is set, the role is re-read from that YAML file on every
/// lookup so that elections and reconfigurations are picked up without a
/// restart.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    config: NodeConfig,
}

impl ConfigNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }
}

impl Node for ConfigNode {
    fn info(&self) -> Result<NodeInfo> {
        let mut info = NodeInfo {
            set_name: self.config.replset.clone(),
            me: self.config.me.clone(),
            state: self.config.state,
            delay_secs: self.config.delay_secs,
        };

        if let Some(path) = &self.config.state_file {
            let content = fs::read_to_string(path).map_err(|e| {
                AgentError::Node(format!(
                    "failed to read node state file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            let status: NodeStatus = serde_yaml::from_str(&content).map_err(|e| {
                AgentError::Node(format!(
                    "failed to parse node state file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            info.state = status.state;
            info.delay_secs = status.delay_secs;
        }

        Ok(info)
    }
}
