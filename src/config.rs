use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::validation::InputValidator;

pub const ENDPOINT_ENV: &str = "FILE_INTAKE_ENDPOINT";
pub const LOG_LEVEL_ENV: &str = "FILE_INTAKE_LOG_LEVEL";

const CONFIG_DIR_NAME: &str = "File Intake";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow endpoint that receives one multipart POST per file
    pub endpoint_url: String,
    /// No timeout when unset
    pub request_timeout_secs: Option<u64>,
    /// Uploads are uncapped when unset
    pub max_concurrent_uploads: Option<usize>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:5678/webhook/file-intake".to_string(),
            request_timeout_secs: None,
            max_concurrent_uploads: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Environment variables take precedence over the file
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENDPOINT_ENV) {
            if !url.trim().is_empty() {
                self.endpoint_url = url.trim().to_string();
            }
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.log_level = level.trim().to_lowercase();
            }
        }
        self
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(CONFIG_DIR_NAME);

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

/// Load from `path`, writing defaults there first if it does not exist
pub fn load_config_from(path: &Path) -> AppResult<Config> {
    if path.exists() {
        let config_str = fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        });
        config.log_level = config.log_level.trim().to_lowercase();

        validate_config(&config)?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save_config_to(path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config_to(path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Keep the previous file around
    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str)?;

    log::info!("Configuration saved to {}", path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    InputValidator::validate_endpoint_url(&config.endpoint_url)?;

    if config.request_timeout_secs == Some(0) {
        return Err(AppError::validation("request_timeout_secs", "Must be greater than 0"));
    }

    if config.max_concurrent_uploads == Some(0) {
        return Err(AppError::validation("max_concurrent_uploads", "Must be at least 1"));
    }

    let valid_log_levels = ["off", "error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

/// Reset configuration to defaults, backing up the current file
pub fn reset_config_at(path: &Path) -> AppResult<()> {
    if path.exists() {
        let backup_path = path.with_extension("json.reset_backup");
        fs::copy(path, &backup_path)?;
        log::info!("Existing config backed up to {}", backup_path.display());
    }

    save_config_to(path, &Config::default())?;
    log::info!("Configuration reset to defaults");
    Ok(())
}
