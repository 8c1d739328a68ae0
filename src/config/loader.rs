//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::DetectorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the namespace to watch.
pub const NAMESPACE_ENV: &str = "NAMESPACE";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse configuration from TOML text without touching the environment.
pub fn parse_config(content: &str) -> Result<DetectorConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Apply environment overrides on top of file values.
pub fn apply_env_overrides(config: &mut DetectorConfig) {
    if let Ok(namespace) = std::env::var(NAMESPACE_ENV) {
        if !namespace.is_empty() {
            config.controller.namespace = Some(namespace);
        }
    }
}

/// Load, override and validate configuration. `None` starts from defaults.
pub fn load_config(path: Option<&Path>) -> Result<DetectorConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => DetectorConfig::default(),
    };

    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
