use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.auto-refactor/config.toml`.
///
/// **Security**: This struct NEVER stores API keys or tokens. Credentials
/// are read from environment variables at runtime through
/// [`CredentialProvider`]; config only stores the *name* of the env var.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub crew: CrewConfig,
}

impl Config {
    /// Load config from `~/.auto-refactor/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.provider.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".auto-refactor")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be \"pretty\" or \"json\", got {other:?}"
            ))),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

/// Which completion backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Override for the API base URL (required for `local`).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Env var holding the API key. Falls back to the provider's
    /// conventional variable when unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            base_url: None,
            api_key_env: None,
        }
    }
}

impl ProviderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("provider.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "provider.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.kind == ProviderKind::Local && self.base_url.is_none() {
            return Err(ConfigError::Validation(
                "provider.base_url is required when provider.kind = \"local\"".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the API key for this provider from the environment.
    pub fn api_key(&self) -> Option<String> {
        if let Some(ref var) = self.api_key_env {
            return CredentialProvider::from_env(var);
        }
        match self.kind {
            ProviderKind::OpenAi => CredentialProvider::openai_api_key(),
            ProviderKind::Anthropic => CredentialProvider::anthropic_api_key(),
            ProviderKind::Local => None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Blocking mode: instructions with fewer words than this (and no
    /// target) go straight to the chat agent.
    #[serde(default = "default_chat_word_threshold")]
    pub chat_word_threshold: usize,
    /// Character budget for the codebase context shown to the planner.
    #[serde(default = "default_planner_context_chars")]
    pub planner_context_chars: usize,
    #[serde(default = "default_true")]
    pub backup_enabled: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Directory names skipped when gathering files from a directory target.
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chat_word_threshold: default_chat_word_threshold(),
            planner_context_chars: default_planner_context_chars(),
            backup_enabled: true,
            dry_run: false,
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.planner_context_chars == 0 {
            return Err(ConfigError::Validation(
                "pipeline.planner_context_chars must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_chat_word_threshold() -> usize {
    4
}
fn default_planner_context_chars() -> usize {
    2000
}
fn default_true() -> bool {
    true
}
fn default_excluded_dirs() -> Vec<String> {
    crate::file_ops::DEFAULT_EXCLUDED_DIRS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewConfig {
    /// When false, delegation always fails and the plan chain runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Model override for the crew; `None` uses `provider.model`.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialProvider
// ---------------------------------------------------------------------------

/// Reads credentials from environment variables at runtime.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Read the OpenAI API key from the `OPENAI_API_KEY` env var.
    pub fn openai_api_key() -> Option<String> {
        Self::from_env("OPENAI_API_KEY")
    }

    /// Read the Anthropic API key from the `ANTHROPIC_API_KEY` env var.
    pub fn anthropic_api_key() -> Option<String> {
        Self::from_env("ANTHROPIC_API_KEY")
    }

    /// Read a credential from a named env var. Empty values count as unset.
    pub fn from_env(var_name: &str) -> Option<String> {
        std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
    }
}
