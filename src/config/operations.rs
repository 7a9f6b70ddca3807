//! Config loading, validation, and path resolution.

use super::model::Config;
use crate::error::{AgentError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Load config from a YAML file.
    ///
    /// Relative paths in the file are resolved against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| AgentError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AgentError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.node.replset.trim().is_empty() {
            return Err(invalid("node.replset must not be empty"));
        }
        if self.node.me.trim().is_empty() {
            return Err(invalid("node.me must not be empty"));
        }
        if self.locks.stale_secs == 0 {
            return Err(invalid("locks.stale_secs must be greater than 0"));
        }
        if self.locks.heartbeat_secs == 0 {
            return Err(invalid("locks.heartbeat_secs must be greater than 0"));
        }
        if self.locks.heartbeat_secs >= self.locks.stale_secs {
            return Err(invalid(&format!(
                "locks.heartbeat_secs ({}) must be less than locks.stale_secs ({})",
                self.locks.heartbeat_secs, self.locks.stale_secs
            )));
        }
        if self.timing.pitr_check_period_ms == 0 {
            return Err(invalid("timing.pitr_check_period_ms must be greater than 0"));
        }
        if self.pitr.enabled && self.pitr.slice_command.trim().is_empty() {
            return Err(invalid("pitr.slice_command is required when pitr.enabled is true"));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.locks.dir);
        if let Some(p) = self.log_file.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.node.state_file.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.runner_workdir.as_mut() {
            resolve(p);
        }
    }
}

fn invalid(msg: &str) -> AgentError {
    AgentError::Config(format!("config validation failed: {}", msg))
}
