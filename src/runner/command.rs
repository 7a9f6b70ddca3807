//! Subprocess runner.
//!
//! Renders a `{var}` command template, splits it with shell-words (no shell
//! is involved), and supervises the child until it exits or is cancelled.

use super::template::{self, Vars};
use super::{BackupRunner, CancelToken, RestoreRunner, RunError, SliceRunner};
use crate::agent::{BackupCommand, RestoreCommand};
use crate::error::{AgentError, Result};
use crate::node::NodeInfo;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs a configured external command.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    template: String,
    workdir: Option<PathBuf>,
}

impl CommandRunner {
    /// Create a runner for `template`. An empty template is rejected.
    pub fn new(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(AgentError::Runner("command template is empty".to_string()));
        }
        Ok(Self {
            template: template.to_string(),
            workdir: None,
        })
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Run the command with `vars` and wait for it. When `cancel` fires the
    /// child is killed and [`RunError::Cancelled`] is returned.
    pub fn execute(
        &self,
        vars: &Vars<'_>,
        cancel: Option<&CancelToken>,
    ) -> std::result::Result<(), RunError> {
        let command_line =
            template::render(&self.template, vars).map_err(|e| RunError::Failed(e.to_string()))?;

        let args = shell_words::split(&command_line).map_err(|e| {
            RunError::Failed(format!("failed to parse command '{}': {}", command_line, e))
        })?;
        let Some((program, rest)) = args.split_first() else {
            return Err(RunError::Failed(format!(
                "command is empty after parsing: '{}'",
                command_line
            )));
        };

        let mut command = Command::new(program);
        command.args(rest);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            RunError::Failed(format!("failed to execute '{}': {}", program, e))
        })?;
        tracing::debug!(command = %command_line, pid = child.id(), "runner started");

        wait_for(&mut child, cancel).map_err(|e| match e {
            RunError::Failed(msg) => RunError::Failed(format!("'{}' {}", command_line, msg)),
            cancelled => cancelled,
        })
    }
}

/// Poll the child until it exits or `cancel` fires.
fn wait_for(child: &mut Child, cancel: Option<&CancelToken>) -> std::result::Result<(), RunError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                return Err(RunError::Failed(match status.code() {
                    Some(code) => format!("exited with status {}", code),
                    None => "was terminated by a signal".to_string(),
                }));
            }
            Ok(None) => {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunError::Cancelled);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(RunError::Failed(format!(
                    "could not be checked: {}",
                    e
                )));
            }
        }
    }
}

impl BackupRunner for CommandRunner {
    fn run(
        &self,
        cmd: &BackupCommand,
        node: &NodeInfo,
        cancel: &CancelToken,
    ) -> std::result::Result<(), RunError> {
        let vars = Vars::from([
            ("name", cmd.name.as_str()),
            ("replset", node.set_name.as_str()),
            ("node", node.me.as_str()),
        ]);
        self.execute(&vars, Some(cancel))
    }
}

impl RestoreRunner for CommandRunner {
    fn run(&self, cmd: &RestoreCommand, node: &NodeInfo) -> std::result::Result<(), RunError> {
        let vars = Vars::from([
            ("name", cmd.name.as_str()),
            ("backup", cmd.backup_name.as_str()),
            ("replset", node.set_name.as_str()),
            ("node", node.me.as_str()),
        ]);
        self.execute(&vars, None)
    }
}

impl SliceRunner for CommandRunner {
    fn run(&self, node: &NodeInfo, stop: &CancelToken) -> std::result::Result<(), RunError> {
        let vars = Vars::from([
            ("replset", node.set_name.as_str()),
            ("node", node.me.as_str()),
        ]);
        self.execute(&vars, Some(stop))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn node() -> NodeInfo {
        NodeInfo::secondary("rs0", "node1:27017")
    }

    #[test]
    fn empty_template_is_rejected() {
        let err = CommandRunner::new("  ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn successful_backup_command() {
        let runner = CommandRunner::new("sh -c \"test {name} = bk1 && test {replset} = rs0\"")
            .unwrap();
        let cmd = BackupCommand::new("bk1");
        BackupRunner::run(&runner, &cmd, &node(), &CancelToken::new()).unwrap();
    }

    #[test]
    fn restore_command_sees_backup_name() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = CommandRunner::new("sh -c \"echo {backup} > restored.txt\"")
            .unwrap()
            .with_workdir(temp_dir.path());
        let cmd = RestoreCommand::new("r1", "bk1");
        RestoreRunner::run(&runner, &cmd, &node()).unwrap();

        let written = std::fs::read_to_string(temp_dir.path().join("restored.txt")).unwrap();
        assert_eq!(written.trim(), "bk1");
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let runner = CommandRunner::new("sh -c \"exit 3\"").unwrap();
        let err = SliceRunner::run(&runner, &node(), &CancelToken::new()).unwrap_err();
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("status 3"));
    }

    #[test]
    fn missing_program_is_failure() {
        let runner = CommandRunner::new("nonexistent_backup_tool_xyz {name}").unwrap();
        let err = BackupRunner::run(
            &runner,
            &BackupCommand::new("bk1"),
            &node(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to execute"));
    }

    #[test]
    fn undefined_variable_is_failure() {
        let runner = CommandRunner::new("dump {backup}").unwrap();
        let err = BackupRunner::run(
            &runner,
            &BackupCommand::new("bk1"),
            &node(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("undefined variable 'backup'"));
    }

    #[test]
    fn cancellation_kills_child() {
        let runner = CommandRunner::new("sleep 30").unwrap();
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            remote.cancel();
        });

        let start = Instant::now();
        let err = BackupRunner::run(&runner, &BackupCommand::new("bk1"), &node(), &token)
            .unwrap_err();
        assert_eq!(err, RunError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }
}
