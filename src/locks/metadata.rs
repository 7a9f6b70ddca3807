//! Lock metadata structures and utilities.

use super::store::LockError;
use super::types::LockHeader;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Lock metadata stored in lock files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    /// The header the lock was acquired with.
    pub header: LockHeader,

    /// Owner of the lock process (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was created (RFC3339).
    pub created_at: DateTime<Utc>,

    /// Last time the holder proved it is alive.
    pub heartbeat: DateTime<Utc>,
}

impl LockMetadata {
    /// Create new lock metadata with the current timestamp.
    pub fn new(header: &LockHeader) -> Self {
        let now = Utc::now();
        Self {
            header: header.clone(),
            owner: owner_string(),
            pid: Some(std::process::id()),
            created_at: now,
            heartbeat: now,
        }
    }

    /// Parse lock metadata from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LockError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LockError::Store(format!(
                "failed to read lock file '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            LockError::Store(format!(
                "failed to parse lock file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize lock metadata to JSON string.
    pub fn to_json(&self) -> Result<String, LockError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LockError::Store(format!("failed to serialize lock metadata: {}", e)))
    }

    /// Time since the last heartbeat.
    pub fn heartbeat_age(&self) -> Duration {
        Utc::now().signed_duration_since(self.heartbeat)
    }

    /// Format the heartbeat age as a human-readable string.
    pub fn heartbeat_age_string(&self) -> String {
        let age = self.heartbeat_age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds.max(0))
        }
    }

    /// Check if the holder has missed heartbeats for longer than `stale_secs`.
    pub fn is_stale(&self, stale_secs: u64) -> bool {
        self.heartbeat_age().num_milliseconds() > (stale_secs as i64).saturating_mul(1000)
    }
}

/// `user@host` of the current process.
pub(crate) fn owner_string() -> String {
    let user = ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_else(|| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", user, host)
}
