//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables that override file settings.
pub const ENV_API_KEY: &str = "CREEM_API_KEY";
pub const ENV_API_HOST: &str = "CREEM_API_HOST";
pub const ENV_LISTEN_ADDRESS: &str = "SERVER_LISTEN_ADDRESS";
pub const ENV_LISTEN_PORT: &str = "SERVER_LISTEN_PORT";
pub const ENV_DATA_DIR: &str = "SERVER_DATA_DIR";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply process
/// environment overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<GateConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<GateConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GateConfig::default(),
    };

    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay non-empty environment values onto the configuration.
pub fn apply_env_overrides<F>(config: &mut GateConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|value| !value.is_empty());

    if let Some(key) = env(ENV_API_KEY) {
        config.upstream.api_key = key;
    }
    if let Some(host) = env(ENV_API_HOST) {
        config.upstream.base_url = host;
    }
    if let Some(dir) = env(ENV_DATA_DIR) {
        config.data_dir = PathBuf::from(dir);
    }

    let address = env(ENV_LISTEN_ADDRESS);
    let port = env(ENV_LISTEN_PORT);
    if address.is_some() || port.is_some() {
        let (current_host, current_port) = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.to_string()))
            .unwrap_or_else(|| ("0.0.0.0".to_string(), "8443".to_string()));
        config.listener.bind_address = format!(
            "{}:{}",
            address.unwrap_or(current_host),
            port.unwrap_or(current_port)
        );
    }
}
