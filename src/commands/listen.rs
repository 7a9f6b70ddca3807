//! Implementation of the `replset-agent listen` command.
//!
//! `listen` reads commands from stdin, one JSON object per line:
//!
//! ```text
//! {"cmd":"backup","name":"bk1"}
//! {"cmd":"restore","name":"r1","backup_name":"bk1"}
//! {"cmd":"cancel_backup"}
//! ```
//!
//! Backups and restores are fire-and-forget: each runs on its own thread and
//! the next line is read right away, so a `cancel_backup` can reach a backup
//! that is still running. At end of input the loop waits for in-flight
//! commands, then stops the PITR slicer.

use super::Services;
use crate::agent::{Agent, BackupCommand, RestoreCommand};
use crate::config::Config;
use crate::error::{AgentError, Result};
use serde::Deserialize;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One line of input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Inbound {
    Backup { name: String },
    Restore { name: String, backup_name: String },
    CancelBackup,
}

pub fn cmd_listen(config: &Config) -> Result<()> {
    let services = Services::new(config);
    let agent = Arc::new(services.agent(config)?);

    let slicer = if config.pitr.enabled {
        let slicer = services.slicer(config, agent.pitr_handle())?;
        let stop = slicer.stop_token();
        let handle = thread::Builder::new()
            .name("pitr".to_string())
            .spawn(move || slicer.run())
            .map_err(|e| AgentError::Io(format!("failed to start PITR slicer: {}", e)))?;
        Some((stop, handle))
    } else {
        None
    };

    tracing::info!(
        node = %config.node.me,
        replset = %config.node.replset,
        "listening for commands"
    );
    let served = serve(&agent, io::stdin().lock());

    if let Some((stop, handle)) = slicer {
        stop.cancel();
        agent.pitr_handle().waker.wake();
        if handle.join().is_err() {
            tracing::error!("PITR slicer panicked");
        }
    }

    served
}

/// Dispatch every command in `input`, then wait for them to finish.
fn serve<R: BufRead>(agent: &Arc<Agent>, input: R) -> Result<()> {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line = line.map_err(|e| AgentError::Io(format!("failed to read command: {}", e)))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let inbound = match serde_json::from_str::<Inbound>(line) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "skipping malformed command");
                continue;
            }
        };

        match inbound {
            Inbound::Backup { name } => {
                let agent = Arc::clone(agent);
                let cmd = BackupCommand { name };
                workers.push(spawn(&format!("backup-{}", cmd.name), move || {
                    agent.backup(&cmd)
                })?);
            }
            Inbound::Restore { name, backup_name } => {
                let agent = Arc::clone(agent);
                let cmd = RestoreCommand { name, backup_name };
                workers.push(spawn(&format!("restore-{}", cmd.name), move || {
                    agent.restore(&cmd)
                })?);
            }
            Inbound::CancelBackup => {
                if !agent.cancel_backup() {
                    tracing::debug!("no backup to cancel");
                }
            }
        }

        workers.retain(|worker| !worker.is_finished());
    }

    for worker in workers {
        if worker.join().is_err() {
            tracing::error!("command thread panicked");
        }
    }
    Ok(())
}

fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| AgentError::Io(format!("failed to start command thread: {}", e)))
}
