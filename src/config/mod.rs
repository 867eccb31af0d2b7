use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Environment variables that override file settings.
pub mod env {
    pub const WEBHOOK_URL: &str = "MAKE_WEBHOOK_URL";
    pub const MEETING_ID_WEBHOOK_URL: &str = "MAKE_MEETING_ID_WEBHOOK_URL";
    pub const SUPABASE_URL: &str = "SUPABASE_URL";
    pub const SUPABASE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
    pub const BASE_URL: &str = "BASE_URL";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub automation: AutomationConfig,
    pub transcripts: TranscriptsConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public URL of this service, used to build video download links.
    pub base_url: String,
    pub max_upload_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            max_upload_mb: 500,
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }
}

/// Automation webhook endpoints. Any empty per-action URL falls back to
/// `webhook_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub webhook_url: String,
    /// Content generation requests for meetings imported by id.
    pub meeting_id_webhook_url: String,
    pub content_generation_url: String,
    pub poster_url: String,
    pub social_publish_url: String,
    pub timeout_seconds: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            meeting_id_webhook_url: String::new(),
            content_generation_url: String::new(),
            poster_url: String::new(),
            social_publish_url: String::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptsConfig {
    pub supabase_url: String,
    pub supabase_key: String,
}

impl TranscriptsConfig {
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_key.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minutes a step may stay `in_progress` before it is reported as stale.
    pub stale_after_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            config
        } else {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay non-empty values from the environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(env::WEBHOOK_URL) {
            self.automation.webhook_url = url;
        }
        if let Some(url) = get(env::MEETING_ID_WEBHOOK_URL) {
            self.automation.meeting_id_webhook_url = url;
        }
        if let Some(url) = get(env::SUPABASE_URL) {
            self.transcripts.supabase_url = url;
        }
        if let Some(key) = get(env::SUPABASE_KEY) {
            self.transcripts.supabase_key = key;
        }
        if let Some(url) = get(env::BASE_URL) {
            self.server.base_url = url;
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
