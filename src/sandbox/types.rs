use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sandbox API key. Never printed.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// What `create` asks the sandbox collaborator for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub template: String,
    pub resolution: Resolution,
    pub dpi: u32,
    pub auth_enabled: bool,
    #[serde(with = "duration_secs")]
    pub initial_timeout: Duration,
}

impl SandboxConfig {
    pub fn from_settings(settings: &crate::config::SandboxSettings) -> Self {
        Self {
            template: settings.template.clone(),
            resolution: settings.resolution,
            dpi: settings.dpi,
            auth_enabled: settings.auth_enabled,
            initial_timeout: Duration::from_secs(settings.initial_timeout_secs),
        }
    }
}

/// A sandbox visible under the caller's credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRef {
    pub id: String,
    #[serde(default)]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickKind {
    Left,
    Right,
    Middle,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let cred = Credential::new("e2b_secret");
        assert_eq!(format!("{cred:?}"), "Credential(<redacted>)");
        assert_eq!(cred.expose(), "e2b_secret");
        assert!(Credential::new("  ").is_empty());
    }

    #[test]
    fn sandbox_config_from_settings() {
        let settings = crate::config::SandboxSettings {
            resolution: Resolution { width: 800, height: 600 },
            initial_timeout_secs: 90,
            ..Default::default()
        };
        let cfg = SandboxConfig::from_settings(&settings);
        assert_eq!(cfg.resolution.to_string(), "800x600");
        assert_eq!(cfg.initial_timeout, Duration::from_secs(90));
        assert_eq!(cfg.template, "desktop");
    }
}
