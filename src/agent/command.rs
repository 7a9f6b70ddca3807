//! Inbound commands.

use serde::{Deserialize, Serialize};

/// Take a full backup named `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCommand {
    pub name: String,
}

impl BackupCommand {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Restore the backup `backup_name` as the operation `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCommand {
    pub name: String,
    pub backup_name: String,
}

impl RestoreCommand {
    pub fn new(name: &str, backup_name: &str) -> Self {
        Self {
            name: name.to_string(),
            backup_name: backup_name.to_string(),
        }
    }
}
