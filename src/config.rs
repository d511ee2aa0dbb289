use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::ScrollMode;
use crate::sandbox::types::Resolution;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Model identifier (e.g. "sonnet") to provider + wire model name.
    #[serde(default = "default_models")]
    pub models: HashMap<String, ModelEntry>,
    #[serde(default)]
    pub grounding: Option<GroundingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Falls back to `DESKPILOT_SANDBOX_API_KEY`, then `E2B_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default)]
    pub auth_enabled: bool,
    #[serde(default = "default_initial_timeout")]
    pub initial_timeout_secs: u64,
    /// Duration applied on every "extend" request (reset, not added).
    #[serde(default = "default_extend_timeout")]
    pub extend_timeout_secs: u64,
    #[serde(default = "default_countdown_poll")]
    pub countdown_poll_secs: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            template: default_template(),
            resolution: Resolution::default(),
            dpi: default_dpi(),
            auth_enabled: false,
            initial_timeout_secs: default_initial_timeout(),
            extend_timeout_secs: default_extend_timeout(),
            countdown_poll_secs: default_countdown_poll(),
        }
    }
}

impl SandboxSettings {
    /// Resolves the sandbox credential: config value first, then environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("DESKPILOT_SANDBOX_API_KEY").ok())
            .or_else(|| std::env::var("E2B_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model/tool round trips per turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Fixed wait before every dispatched action.
    #[serde(default = "default_action_delay")]
    pub action_delay_ms: u64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub scroll_mode: ScrollMode,
    #[serde(default = "default_scroll_amount")]
    pub default_scroll_amount: u32,
    #[serde(default = "default_live_view_interval")]
    pub live_view_interval_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            action_delay_ms: default_action_delay(),
            temperature: 0.0,
            scroll_mode: ScrollMode::default(),
            default_scroll_amount: default_scroll_amount(),
            live_view_interval_secs: default_live_view_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafetyConfig {
    #[serde(default)]
    pub allow_terminal_commands: bool,
    /// Regexes; a matching command is refused even when terminal commands are allowed.
    #[serde(default)]
    pub blocked_command_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Full chat-completions URL of an OpenAI-compatible endpoint.
    pub api_base: String,
    /// Optional API key stored in config.toml (env `DESKPILOT_<ID>_API_KEY` wins).
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    pub api_base: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_template() -> String {
    "desktop".into()
}

fn default_dpi() -> u32 {
    96
}

fn default_initial_timeout() -> u64 {
    300
}

fn default_extend_timeout() -> u64 {
    600
}

fn default_countdown_poll() -> u64 {
    1
}

fn default_max_steps() -> u32 {
    30
}

fn default_action_delay() -> u64 {
    2000
}

fn default_scroll_amount() -> u32 {
    1
}

fn default_live_view_interval() -> u64 {
    5
}

fn default_providers() -> HashMap<String, ProviderEntry> {
    let mut providers = HashMap::new();
    providers.insert(
        "anthropic".into(),
        ProviderEntry {
            api_base: "https://api.anthropic.com/v1/chat/completions".into(),
            api_key: None,
        },
    );
    providers.insert(
        "openai".into(),
        ProviderEntry {
            api_base: "https://api.openai.com/v1/chat/completions".into(),
            api_key: None,
        },
    );
    providers.insert(
        "google".into(),
        ProviderEntry {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .into(),
            api_key: None,
        },
    );
    providers
}

fn default_models() -> HashMap<String, ModelEntry> {
    let mut models = HashMap::new();
    models.insert(
        "sonnet".into(),
        ModelEntry {
            provider: "anthropic".into(),
            model: "claude-3-5-sonnet-20241022".into(),
        },
    );
    models.insert(
        "gpt4o".into(),
        ModelEntry {
            provider: "openai".into(),
            model: "gpt-4o".into(),
        },
    );
    models.insert(
        "gemini".into(),
        ModelEntry {
            provider: "google".into(),
            model: "gemini-2.0-flash-001".into(),
        },
    );
    models
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("deskpilot").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable, in working directory or user config dir"
            .into(),
    ))
}

/// Loads `config.toml`; a missing file yields the built-in defaults.
pub fn load_config() -> DeskPilotResult<AppConfig> {
    match resolve_config_path() {
        Ok(path) => load_config_from(&path),
        Err(e) => {
            tracing::warn!(error = %e, "no config file, using defaults");
            Ok(AppConfig::default())
        }
    }
}

pub fn load_config_from(path: &Path) -> DeskPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), models = config.models.len(), "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> DeskPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxSettings::default(),
            agent: AgentSettings::default(),
            safety: SafetyConfig::default(),
            llm: LlmConfig::default(),
            models: default_models(),
            grounding: None,
        }
    }
}
