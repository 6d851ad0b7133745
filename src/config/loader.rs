//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Unknown handler module: {0}")]
    UnknownModule(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Backend credentials and logging may be overridden from the
/// environment (`COUCHURL`, `COUCHUSER`, `COUCHPASS`, `LOG_LEVEL`, `LOG_FILE`).
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GatewayConfig = toml::from_str(&content)?;

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Built-in defaults with environment overrides, for running without a file.
pub fn load_default() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides using the given lookup.
pub fn apply_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("COUCHURL") {
        config.backend.url = url;
    }
    if let Some(user) = lookup("COUCHUSER") {
        config.backend.username = Some(user);
    }
    if let Some(pass) = lookup("COUCHPASS") {
        config.backend.password = Some(pass);
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(path) = lookup("LOG_FILE") {
        config.observability.log_file = Some(path);
    }
}
