//! Configuration file loading and saving
//!
//! This module handles loading configuration from ~/.alert-receivers.json
//! and saving configuration updates.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::AppConfig;
use crate::error::AppConfigError;

const CONFIG_FILE_NAME: &str = ".alert-receivers.json";

/// Get the default configuration file path
/// Returns ~/.alert-receivers.json
pub fn get_config_path() -> Result<PathBuf, AppConfigError> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .ok_or(AppConfigError::NoHomeDir)
}

/// Expand `~` and environment variables in a user supplied path
pub fn expand_path(path: &str) -> Result<PathBuf, AppConfigError> {
    let expanded = shellexpand::full(path).map_err(|e| {
        AppConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            e.to_string(),
        ))
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Load configuration from the default path
/// If the file doesn't exist, returns a default configuration
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from_path(&get_config_path()?)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(default_config());
    }

    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;

    tracing::debug!(
        path = %path.display(),
        integrations = config.integrations.len(),
        "config loaded"
    );
    Ok(config)
}

/// Save configuration to the default path
pub fn save_config(config: &AppConfig) -> Result<(), AppConfigError> {
    save_config_to_path(config, &get_config_path()?)
}

/// Save configuration to a specific path
pub fn save_config_to_path(config: &AppConfig, path: &Path) -> Result<(), AppConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Create a default configuration
pub fn default_config() -> AppConfig {
    AppConfig {
        version: "1.0".to_string(),
        external_url: "http://localhost:3000/".to_string(),
        http_timeout_secs: crate::sender::DEFAULT_TIMEOUT_SECS,
        debug: false,
        integrations: Vec::new(),
    }
}
