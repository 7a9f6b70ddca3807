//! Lock header and lock information structures.

use super::metadata::LockMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of operation a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A full backup.
    Backup,
    /// A restore from a named backup.
    Restore,
    /// Continuous point-in-time-recovery slicing.
    Pitr,
}

impl OperationType {
    /// Get the lock file prefix and log key for this operation type.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Backup => "backup",
            OperationType::Restore => "restore",
            OperationType::Pitr => "pitr",
        }
    }

    /// Parse an operation type from its lowercase name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "backup" => Some(Self::Backup),
            "restore" => Some(Self::Restore),
            "pitr" => Some(Self::Pitr),
            _ => None,
        }
    }

    /// Whether locks of this type are scoped by operation name.
    pub fn is_named(&self) -> bool {
        !matches!(self, OperationType::Pitr)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compound key identifying a distributed mutual-exclusion domain.
///
/// Which fields take part in contention depends on `op`: backup and restore
/// locks are keyed by `(op, replset, name)`, PITR locks by `replset` alone.
/// `node` records who asked for the lock and is used for ownership checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockHeader {
    pub op: OperationType,
    pub replset: String,
    pub node: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl LockHeader {
    pub fn backup(replset: &str, node: &str, name: &str) -> Self {
        Self {
            op: OperationType::Backup,
            replset: replset.to_string(),
            node: node.to_string(),
            name: name.to_string(),
        }
    }

    pub fn restore(replset: &str, node: &str, name: &str) -> Self {
        Self {
            op: OperationType::Restore,
            replset: replset.to_string(),
            node: node.to_string(),
            name: name.to_string(),
        }
    }

    pub fn pitr(replset: &str, node: &str) -> Self {
        Self {
            op: OperationType::Pitr,
            replset: replset.to_string(),
            node: node.to_string(),
            name: String::new(),
        }
    }

    /// Whether two headers name the same lock, ignoring the requesting node.
    pub fn same_lock(&self, other: &LockHeader) -> bool {
        self.op == other.op
            && self.replset == other.replset
            && (!self.op.is_named() || self.name == other.name)
    }
}

impl fmt::Display for LockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.is_named() {
            write!(f, "{}/{}/{}@{}", self.op, self.replset, self.name, self.node)
        } else {
            write!(f, "{}/{}@{}", self.op, self.replset, self.node)
        }
    }
}

/// Information about a lock present in the store.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The lock file path.
    pub path: PathBuf,

    /// The lock metadata, including the header of the holder.
    pub metadata: LockMetadata,

    /// Whether the lock's heartbeat is older than the stale threshold.
    pub is_stale: bool,
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (owner: {}, heartbeat: {} ago{})",
            self.metadata.header,
            self.metadata.owner,
            self.metadata.heartbeat_age_string(),
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}
