use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::client::DEFAULT_BASE_URL;
use crate::session::DEFAULT_SESSION_ID;

pub const URL_ENV: &str = "ACCOUNT_PLANNER_URL";
pub const SESSION_ENV: &str = "ACCOUNT_PLANNER_SESSION";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub session_id: String,
    /// Delay between revealed characters of a bot reply; 0 shows replies at once
    pub typing_delay_ms: u64,
    /// Speech-to-text command as argv, e.g. `["whisper-stream", "--lang", "{lang}"]`
    pub voice_command: Option<Vec<String>>,
    pub voice_lang: String,
    pub export_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            typing_delay_ms: 10,
            voice_command: None,
            voice_lang: "en-US".to_string(),
            export_path: PathBuf::from("account-plan-transcript.html"),
        }
    }

    /// Load from the user config file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::get_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(session) = lookup(SESSION_ENV).filter(|v| !v.trim().is_empty()) {
            self.session_id = session;
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("account-planner").join("config.json"))
    }

    pub fn default_log_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("account-planner")
            .join("account-planner.log")
    }
}
