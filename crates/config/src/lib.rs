//! Configuration loading, validation, and management for Vigil.
//!
//! Loads configuration from `~/.vigil/config.toml` with environment variable
//! overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_core::subagent::SubagentDefinition;

/// The root configuration structure.
///
/// Maps directly to `~/.vigil/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used by the conversation service
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Investigation loop and registry limits
    #[serde(default)]
    pub investigation: InvestigationConfig,

    /// Limits applied to delegated subtasks
    #[serde(default)]
    pub subagent: SubagentConfig,

    /// Named subagents the investigation may delegate to
    #[serde(default)]
    pub agents: Vec<SubagentDefinition>,

    /// Run-record persistence
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Investigation limits and escalation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationConfig {
    /// Maximum tool-executing actions per run
    #[serde(default = "default_max_actions")]
    pub max_actions: u32,

    /// Wall-clock limit per run in seconds (0 = none)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// Maximum simultaneously registered runs (0 = unlimited)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Tool allow-list. Absent = allow all, empty = block all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,

    /// Substring patterns refused in shell commands
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,

    /// Escalate when self-reported confidence is below this (0 = never)
    #[serde(default = "default_escalate_on_confidence")]
    pub escalate_on_confidence: f64,

    /// Flag failed runs as escalated
    #[serde(default = "default_true")]
    pub escalate_on_errors: bool,

    /// Investigate critical alerts as soon as they arrive
    #[serde(default = "default_true")]
    pub auto_start_for_critical: bool,
}

fn default_max_actions() -> u32 {
    20
}
fn default_max_duration_secs() -> u64 {
    900
}
fn default_max_concurrent() -> usize {
    5
}
fn default_escalate_on_confidence() -> f64 {
    0.6
}
fn default_blocked_commands() -> Vec<String> {
    vec![
        "rm -rf".into(),
        "mkfs".into(),
        "dd if=".into(),
        "shutdown".into(),
        "reboot".into(),
        ":(){".into(),
    ]
}

impl InvestigationConfig {
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            max_duration_secs: default_max_duration_secs(),
            max_concurrent: default_max_concurrent(),
            allowed_tools: None,
            blocked_commands: default_blocked_commands(),
            escalate_on_confidence: default_escalate_on_confidence(),
            escalate_on_errors: true,
            auto_start_for_critical: true,
        }
    }
}

/// Limits applied to delegated subtasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentConfig {
    #[serde(default = "default_subagent_max_actions")]
    pub max_actions: u32,

    #[serde(default = "default_subagent_max_duration_secs")]
    pub max_duration_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,

    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,

    /// Deepest nesting at which delegation is still accepted
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

fn default_subagent_max_actions() -> u32 {
    10
}
fn default_subagent_max_duration_secs() -> u64 {
    300
}
fn default_max_depth() -> u32 {
    2
}

impl SubagentConfig {
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_actions: default_subagent_max_actions(),
            max_duration_secs: default_subagent_max_duration_secs(),
            allowed_tools: None,
            blocked_commands: default_blocked_commands(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", "file" or "none"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Path of the JSON-lines file for the "file" backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.vigil/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `VIGIL_*` overrides read through `lookup`.
    ///
    /// - `VIGIL_MODEL`
    /// - `VIGIL_MAX_ACTIONS`
    /// - `VIGIL_MAX_CONCURRENT`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(model) = lookup("VIGIL_MODEL") {
            self.default_model = model;
        }
        if let Some(raw) = lookup("VIGIL_MAX_ACTIONS") {
            self.investigation.max_actions = parse_override("VIGIL_MAX_ACTIONS", &raw)?;
        }
        if let Some(raw) = lookup("VIGIL_MAX_CONCURRENT") {
            self.investigation.max_concurrent = parse_override("VIGIL_MAX_CONCURRENT", &raw)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".vigil")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.investigation.max_actions == 0 {
            return Err(ConfigError::ValidationError(
                "investigation.max_actions must be greater than 0".into(),
            ));
        }

        if self.subagent.max_actions == 0 {
            return Err(ConfigError::ValidationError(
                "subagent.max_actions must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.investigation.escalate_on_confidence) {
            return Err(ConfigError::ValidationError(
                "investigation.escalate_on_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if self.subagent.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "subagent.max_depth must be at least 1".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "memory" | "file" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}'",
                self.store.backend
            )));
        }

        if let Some(agent) = self.agents.iter().find(|a| a.name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "subagent with empty name (instructions: {:?})",
                agent.instructions
            )));
        }

        Ok(())
    }

    /// Look up a configured subagent by name.
    pub fn agent(&self, name: &str) -> Option<&SubagentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            investigation: InvestigationConfig::default(),
            subagent: SubagentConfig::default(),
            agents: vec![],
            store: StoreConfig::default(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{raw}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.investigation.max_actions, 20);
        assert_eq!(config.investigation.max_concurrent, 5);
        assert!(config.investigation.allowed_tools.is_none());
        assert_eq!(config.store.backend, "memory");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.investigation, config.investigation);
        assert_eq!(parsed.subagent, config.subagent);
    }

    #[test]
    fn empty_allow_list_is_distinct_from_absent() {
        let config: AppConfig = toml::from_str(
            r#"
[investigation]
allowed_tools = []
"#,
        )
        .unwrap();
        assert_eq!(config.investigation.allowed_tools, Some(vec![]));

        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.investigation.allowed_tools, None);
    }

    #[test]
    fn invalid_confidence_threshold_rejected() {
        let mut config = AppConfig::default();
        config.investigation.escalate_on_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_actions_rejected() {
        let mut config = AppConfig::default();
        config.investigation.max_actions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "etcd".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().investigation.max_actions, 20);
    }

    #[test]
    fn load_from_file_with_agents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "fast-model"

[investigation]
max_actions = 8
max_concurrent = 0
allowed_tools = ["bash", "read_file"]
escalate_on_confidence = 0.5

[[agents]]
name = "log-reader"
description = "Reads service logs"
instructions = "Find the first error in the logs."
model = "inherit"
allowed_tools = ["read_file"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "fast-model");
        assert_eq!(config.investigation.max_actions, 8);
        assert_eq!(config.investigation.max_concurrent, 0);
        assert_eq!(config.agents.len(), 1);
        let agent = config.agent("log-reader").unwrap();
        assert_eq!(agent.model_override(), None);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "investigation = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("VIGIL_MODEL", "override-model"),
            ("VIGIL_MAX_ACTIONS", "7"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_model, "override-model");
        assert_eq!(config.investigation.max_actions, 7);
        assert_eq!(config.investigation.max_concurrent, 5);
    }

    #[test]
    fn bad_env_override_is_rejected() {
        let mut config = AppConfig::default();
        let result =
            config.apply_overrides(|k| (k == "VIGIL_MAX_CONCURRENT").then(|| "lots".into()));
        assert!(result.is_err());
    }

    #[test]
    fn durations_map_zero_to_none() {
        let mut config = InvestigationConfig::default();
        assert_eq!(config.max_duration(), Some(Duration::from_secs(900)));
        config.max_duration_secs = 0;
        assert_eq!(config.max_duration(), None);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[investigation]"));
        assert!(toml_str.contains("max_actions = 20"));
    }
}
