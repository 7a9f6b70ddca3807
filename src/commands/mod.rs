//! Command implementations for the replset agent.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, and wires configuration into the coordinator and the
//! PITR slicer.

mod listen;
mod lock;
mod log_cmd;

use crate::agent::{Agent, BackupCommand, RestoreCommand, Runners, Timing};
use crate::cli::{BackupArgs, Command, LockAction, RestoreArgs};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::locks::FileLockStore;
use crate::log::AgentLog;
use crate::node::{ConfigNode, NodeInfo};
use crate::pitr::{PitrHandle, PitrSlicer};
use crate::runner::{BackupRunner, CommandRunner, RestoreRunner, RunError};
use std::sync::Arc;

/// Dispatch a command to its implementation.
pub fn dispatch(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Backup(args) => cmd_backup(config, args),
        Command::Restore(args) => cmd_restore(config, args),
        Command::Listen => listen::cmd_listen(config),
        Command::Lock(lock_cmd) => match lock_cmd.action {
            LockAction::List => lock::cmd_lock_list(config),
            LockAction::Clear(args) => lock::cmd_lock_clear(config, args),
        },
        Command::Log(args) => log_cmd::cmd_log(config, args),
    }
}

fn cmd_backup(config: &Config, args: BackupArgs) -> Result<()> {
    require_command(&config.backup_command, "backup_command")?;
    let agent = Services::new(config).agent(config)?;
    agent.backup(&BackupCommand::new(&args.name));
    Ok(())
}

fn cmd_restore(config: &Config, args: RestoreArgs) -> Result<()> {
    require_command(&config.restore_command, "restore_command")?;
    let agent = Services::new(config).agent(config)?;
    agent.restore(&RestoreCommand::new(&args.name, &args.backup_name));
    Ok(())
}

fn require_command(template: &str, key: &str) -> Result<()> {
    if template.trim().is_empty() {
        return Err(AgentError::Config(format!(
            "{} is not configured\n\nSet it in the agent config, e.g.:\n  {}: \"mybackup --name {{name}}\"",
            key, key
        )));
    }
    Ok(())
}

/// Collaborators shared by the coordinator and the PITR slicer.
pub(crate) struct Services {
    pub node: Arc<ConfigNode>,
    pub locks: Arc<FileLockStore>,
    pub log: Arc<AgentLog>,
}

impl Services {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            node: Arc::new(ConfigNode::new(config.node.clone())),
            locks: Arc::new(FileLockStore::new(
                &config.locks.dir,
                config.locks.stale_secs,
            )),
            log: Arc::new(AgentLog::new(&config.node.me, config.log_file.clone())),
        }
    }

    pub(crate) fn agent(&self, config: &Config) -> Result<Agent> {
        let backup: Arc<dyn BackupRunner> = if config.backup_command.trim().is_empty() {
            Arc::new(NotConfigured("backup_command"))
        } else {
            Arc::new(command_runner(config, &config.backup_command)?)
        };
        let restore: Arc<dyn RestoreRunner> = if config.restore_command.trim().is_empty() {
            Arc::new(NotConfigured("restore_command"))
        } else {
            Arc::new(command_runner(config, &config.restore_command)?)
        };

        Ok(Agent::new(
            self.node.clone(),
            self.locks.clone(),
            Runners { backup, restore },
            self.log.clone(),
            Timing::from_config(config),
        ))
    }

    pub(crate) fn slicer(&self, config: &Config, shared: PitrHandle) -> Result<PitrSlicer> {
        let runner = command_runner(config, &config.pitr.slice_command)?;
        Ok(PitrSlicer::new(
            self.node.clone(),
            self.locks.clone(),
            Arc::new(runner),
            self.log.clone(),
            shared,
            config.timing.pitr_check_period(),
            config.locks.heartbeat(),
        ))
    }
}

fn command_runner(config: &Config, template: &str) -> Result<CommandRunner> {
    let runner = CommandRunner::new(template)?;
    Ok(match &config.runner_workdir {
        Some(dir) => runner.with_workdir(dir),
        None => runner,
    })
}

/// Stands in for a runner whose command is missing from the config.
struct NotConfigured(&'static str);

impl NotConfigured {
    fn fail(&self) -> std::result::Result<(), RunError> {
        Err(RunError::Failed(format!("{} is not configured", self.0)))
    }
}

impl BackupRunner for NotConfigured {
    fn run(
        &self,
        _cmd: &BackupCommand,
        _node: &NodeInfo,
        _cancel: &crate::runner::CancelToken,
    ) -> std::result::Result<(), RunError> {
        self.fail()
    }
}

impl RestoreRunner for NotConfigured {
    fn run(&self, _cmd: &RestoreCommand, _node: &NodeInfo) -> std::result::Result<(), RunError> {
        self.fail()
    }
}
