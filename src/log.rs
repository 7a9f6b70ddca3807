//! Structured agent log.
//!
//! Every outcome of the coordinator terminates here. Entries are appended in
//! NDJSON format (one JSON object per line) and mirrored as `tracing` events,
//! so an operator can follow a node either through its log file or through
//! the process's subscriber.
//!
//! # Entry Format
//!
//! - `ts`: RFC3339 timestamp
//! - `level`: `debug`, `info`, `warning` or `error`
//! - `op`: `backup`, `restore` or `pitr`
//! - `name`: operation name (backup name, restore name, empty for PITR)
//! - `node`: the node that wrote the entry
//! - `msg`: human-readable message
//!
//! Writing an entry never fails the caller: a sink error is reported through
//! `tracing` and the entry is dropped from the file.

use crate::error::{AgentError, Result};
use crate::locks::OperationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

/// One agent log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub level: Level,
    pub op: OperationType,
    #[serde(default)]
    pub name: String,
    pub node: String,
    pub msg: String,
}

/// Log sink shared by the coordinator and the PITR loop.
#[derive(Debug)]
pub struct AgentLog {
    node: String,
    path: Option<PathBuf>,
    // Serializes appends from concurrent commands so lines never interleave.
    write_lock: Mutex<()>,
}

impl AgentLog {
    /// Log on behalf of `node`, appending to `path` when given.
    pub fn new(node: &str, path: Option<PathBuf>) -> Self {
        Self {
            node: node.to_string(),
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn debug(&self, op: OperationType, name: &str, msg: impl fmt::Display) {
        self.record(Level::Debug, op, name, msg.to_string());
    }

    pub fn info(&self, op: OperationType, name: &str, msg: impl fmt::Display) {
        self.record(Level::Info, op, name, msg.to_string());
    }

    pub fn warning(&self, op: OperationType, name: &str, msg: impl fmt::Display) {
        self.record(Level::Warning, op, name, msg.to_string());
    }

    pub fn error(&self, op: OperationType, name: &str, msg: impl fmt::Display) {
        self.record(Level::Error, op, name, msg.to_string());
    }

    fn record(&self, level: Level, op: OperationType, name: &str, msg: String) {
        match level {
            Level::Debug => tracing::debug!(op = %op, name, "{}", msg),
            Level::Info => tracing::info!(op = %op, name, "{}", msg),
            Level::Warning => tracing::warn!(op = %op, name, "{}", msg),
            Level::Error => tracing::error!(op = %op, name, "{}", msg),
        }

        let Some(path) = &self.path else {
            return;
        };

        let entry = LogEntry {
            ts: Utc::now(),
            level,
            op,
            name: name.to_string(),
            node: self.node.clone(),
            msg,
        };
        if let Err(e) = self.append(path, &entry) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write agent log entry");
        }
    }

    fn append(&self, path: &Path, entry: &LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| AgentError::Io(format!("failed to serialize log entry: {}", e)))?;
        // One write per entry so appends from other processes stay whole.
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                AgentError::Io(format!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                AgentError::Io(format!(
                    "failed to open agent log '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        file.write_all(line.as_bytes()).map_err(|e| {
            AgentError::Io(format!(
                "failed to write agent log '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Selects log entries by operation and name.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub op: Option<OperationType>,
    pub name: Option<String>,
    pub min_level: Option<Level>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.op.is_none_or(|op| op == entry.op)
            && self.name.as_ref().is_none_or(|name| *name == entry.name)
            && self.min_level.is_none_or(|level| entry.level >= level)
    }
}

/// Read every parseable entry from an agent log. Malformed lines are skipped.
pub fn read_entries(path: &Path, filter: &LogFilter) -> Result<Vec<LogEntry>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(AgentError::Io(format!(
                "failed to read agent log '{}': {}",
                path.display(),
                e
            )));
        }
    };

    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str::<LogEntry>(line).ok())
        .filter(|entry| filter.matches(entry))
        .collect())
}
