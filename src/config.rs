//! Configuration management
//!
//! Layered the usual way: compiled-in defaults, then the TOML config file,
//! then environment variables. Nothing here is required to exist except the
//! bot token, which is checked only when the bot actually starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::telegram::TelegramSettings;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram transport settings.
    #[serde(default)]
    pub telegram: TelegramSettings,
    /// Progress database settings.
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to the SQLite progress database. Defaults to the platform data
    /// directory when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageSettings {
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marathon-bot")
        .join("progress.db")
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("marathon-bot").join("config.toml"))
    }

    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config at {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                self.telegram.bot_token = Some(token);
            }
        }
        if let Ok(path) = std::env::var("MARATHON_DB_PATH") {
            if !path.is_empty() {
                self.storage.db_path = Some(PathBuf::from(path));
            }
        }
    }
}
