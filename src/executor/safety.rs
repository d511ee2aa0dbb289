// Gate for the optional shell action.
use regex::Regex;

use crate::config::SafetyConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};

pub struct ShellGate {
    allow: bool,
    blocked: Vec<Regex>,
}

impl ShellGate {
    pub fn from_config(cfg: &SafetyConfig) -> DeskPilotResult<Self> {
        let blocked = cfg
            .blocked_command_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    DeskPilotError::Config(format!("invalid blocked command pattern '{p}': {e}"))
                })
            })
            .collect::<DeskPilotResult<Vec<_>>>()?;
        Ok(Self {
            allow: cfg.allow_terminal_commands,
            blocked,
        })
    }

    /// `Err` carries the reason shown to the model.
    pub fn check(&self, command: &str) -> Result<(), String> {
        if !self.allow {
            return Err("terminal commands are disabled for this session".into());
        }
        if let Some(re) = self.blocked.iter().find(|re| re.is_match(command)) {
            tracing::warn!(command = %command, pattern = %re.as_str(), "blocked shell command");
            return Err(format!("command refused by policy ({})", re.as_str()));
        }
        Ok(())
    }
}
