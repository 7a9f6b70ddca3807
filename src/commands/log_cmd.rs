//! Implementation of the `replset-agent log` command.

use crate::cli::LogArgs;
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::log::{Level, LogEntry, LogFilter, read_entries};

pub fn cmd_log(config: &Config, args: LogArgs) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Err(AgentError::Config(
            "log_file is not configured; agent log entries only went to stderr".to_string(),
        ));
    };

    let filter = LogFilter {
        op: args.op,
        name: args.name,
        min_level: None,
    };
    let entries = read_entries(path, &filter)?;

    for entry in tail(&entries, args.tail) {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn tail(entries: &[LogEntry], n: Option<usize>) -> &[LogEntry] {
    match n {
        Some(n) => &entries[entries.len().saturating_sub(n)..],
        None => entries,
    }
}

fn format_entry(entry: &LogEntry) -> String {
    let level = match entry.level {
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warning => "WARN",
        Level::Error => "ERROR",
    };
    let scope = if entry.name.is_empty() {
        entry.op.to_string()
    } else {
        format!("{}/{}", entry.op, entry.name)
    };
    format!(
        "{} {:<5} [{}] {}: {}",
        entry.ts.format("%Y-%m-%dT%H:%M:%SZ"),
        level,
        scope,
        entry.node,
        entry.msg
    )
}
