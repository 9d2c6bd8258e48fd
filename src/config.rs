use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

const APP_DIR: &str = "notebook-lm";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Key/value preference file holding the legacy snapshot and the import marker.
    #[serde(default = "default_prefs_path")]
    pub prefs_path: String,

    #[serde(default = "default_gemini_api_url")]
    pub gemini_api_url: String,

    #[serde(default = "default_claude_api_url")]
    pub claude_api_url: String,

    #[serde(default = "default_openai_api_url")]
    pub openai_api_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_db_path() -> String {
    data_dir().join("notebook-lm.db").to_string_lossy().to_string()
}

fn default_prefs_path() -> String {
    data_dir().join("preferences.json").to_string_lossy().to_string()
}

fn default_gemini_api_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_claude_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_openai_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            prefs_path: default_prefs_path(),
            gemini_api_url: default_gemini_api_url(),
            claude_api_url: default_claude_api_url(),
            openai_api_url: default_openai_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }
}
