//! CLI argument parsing for the replset agent.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::locks::OperationType;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Per-node agent that coordinates backups and restores across the members
/// of a replica set.
///
/// Every member runs an agent against the same lock directory:
/// - a backup runs on exactly one suitable member
/// - a restore runs on the primary
/// - continuous PITR slicing pauses while a backup starts
#[derive(Parser, Debug)]
#[command(name = "replset-agent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Agent configuration file.
    #[arg(long, global = true, default_value = "agent.yaml")]
    pub config: PathBuf,

    /// Log debug output to stderr.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the backup lifecycle once.
    ///
    /// Checks that this node suits a backup, pauses local PITR slicing,
    /// and runs the backup command if this node wins the backup lock.
    Backup(BackupArgs),

    /// Run the restore lifecycle once.
    ///
    /// Only the primary restores; the restore lock is held for the whole run.
    Restore(RestoreArgs),

    /// Read commands from stdin, one JSON object per line.
    ///
    /// Each command is dispatched on its own thread. PITR slicing runs
    /// alongside when enabled. Stops at end of input once in-flight
    /// commands are done.
    Listen,

    /// Lock management commands.
    ///
    /// List or clear backup, restore and PITR locks.
    Lock(LockCommand),

    /// Show agent log entries.
    Log(LogArgs),
}

/// Arguments for the `backup` command.
#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Backup name, shared by every member that receives the command.
    pub name: String,
}

/// Arguments for the `restore` command.
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Restore operation name.
    pub name: String,

    /// Name of the backup to restore.
    #[arg(long = "backup")]
    pub backup_name: String,
}

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List all locks.
    ///
    /// Shows every lock with its owner and heartbeat age; abandoned locks
    /// are marked STALE.
    List,

    /// Forcibly clear a lock.
    ///
    /// The lock is removed whoever holds it.
    Clear(LockClearArgs),
}

/// Arguments for the `lock clear` command.
#[derive(Parser, Debug)]
pub struct LockClearArgs {
    /// Lock type: backup, restore or pitr.
    #[arg(value_parser = parse_operation)]
    pub op: OperationType,

    /// Operation name (required for backup and restore locks).
    pub name: Option<String>,

    /// Replica set of the lock (defaults to the configured one).
    #[arg(long)]
    pub replset: Option<String>,
}

/// Arguments for the `log` command.
#[derive(Parser, Debug)]
pub struct LogArgs {
    /// Only entries of this operation type.
    #[arg(long, value_parser = parse_operation)]
    pub op: Option<OperationType>,

    /// Only entries for this operation name.
    #[arg(long)]
    pub name: Option<String>,

    /// Show only the last N matching entries.
    #[arg(long)]
    pub tail: Option<usize>,
}

fn parse_operation(s: &str) -> Result<OperationType, String> {
    OperationType::from_str(s)
        .ok_or_else(|| format!("unknown operation '{}' (expected backup, restore or pitr)", s))
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
