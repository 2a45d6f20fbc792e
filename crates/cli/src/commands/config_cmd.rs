//! `vigil config`: configuration management commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use vigil_config::{AppConfig, ConfigError};

/// Load from `path` when given, otherwise from the default location.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}

fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn validate(path: Option<&Path>) -> anyhow::Result<()> {
    println!("Validating {}", config_path(path).display());

    let config = match load(path) {
        Ok(config) => config,
        Err(e) => {
            println!("  error: {e}");
            return Err(e.into());
        }
    };
    println!("  config parsed and validated");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("  all checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("  warning: {w}");
        }
    }

    println!();
    println!("  Model:          {}", config.default_model);
    println!("  Max actions:    {}", config.investigation.max_actions);
    println!("  Max concurrent: {}", config.investigation.max_concurrent);
    println!("  Store:          {}", config.store.backend);
    println!("  Subagents:      {}", config.agents.len());
    Ok(())
}

/// Settings that are valid but probably not what the operator meant.
pub fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config
        .investigation
        .allowed_tools
        .as_ref()
        .is_some_and(Vec::is_empty)
    {
        warnings.push("investigation.allowed_tools is empty, every tool is blocked".to_string());
    }
    if config.investigation.escalate_on_confidence == 0.0 {
        warnings.push(
            "investigation.escalate_on_confidence is 0, confidence never escalates".into(),
        );
    }
    if config.investigation.max_duration_secs == 0 {
        warnings.push("investigation.max_duration_secs is 0, runs have no deadline".into());
    }
    if config.investigation.blocked_commands.is_empty() {
        warnings.push("investigation.blocked_commands is empty".into());
    }

    let mut seen = HashSet::new();
    for agent in &config.agents {
        if !seen.insert(agent.name.as_str()) {
            warnings.push(format!("subagent '{}' is defined more than once", agent.name));
        }
    }
    warnings
}

pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = load(path).context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", config_path(path).display());
}
