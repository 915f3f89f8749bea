use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::RateLimitConfig;

const ENV_PREFIX: &str = "JOURNAL_SYNC_";

/// Connection details for the remote system of record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String, // Never written back out
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite file holding entities, the mutation queue and sync history
    pub database_path: PathBuf,
    /// Authenticated user every record is scoped to
    pub user_id: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Whether the platform reports connectivity at startup
    #[serde(default = "default_start_online")]
    pub start_online: bool,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_notification_capacity() -> usize {
    64
}

fn default_start_online() -> bool {
    true
}

impl EngineConfig {
    pub fn new(database_path: impl Into<PathBuf>, user_id: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            user_id: user_id.into(),
            request_timeout_ms: default_request_timeout_ms(),
            notification_capacity: default_notification_capacity(),
            start_online: default_start_online(),
            remote: None,
        }
    }

    /// Load from a JSON file, then apply `JOURNAL_SYNC_*` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(path) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(user_id) = var("USER_ID") {
            self.user_id = user_id;
        }
        if let Some(timeout) = var("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid {}REQUEST_TIMEOUT_MS: {}", ENV_PREFIX, timeout))?;
        }

        let base_url = var("REMOTE_URL");
        let api_key = var("API_KEY");
        let api_secret = var("API_SECRET");

        if let Some(remote) = self.remote.as_mut() {
            if let Some(base_url) = base_url {
                remote.base_url = base_url;
            }
            if let Some(api_key) = api_key {
                remote.api_key = api_key;
            }
            if let Some(api_secret) = api_secret {
                remote.api_secret = api_secret;
            }
        } else if let Some(base_url) = base_url {
            self.remote = Some(RemoteConfig {
                base_url,
                api_key: api_key.unwrap_or_default(),
                api_secret: api_secret.unwrap_or_default(),
                rate_limit: RateLimitConfig::default(),
            });
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            bail!("user_id must not be empty");
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be greater than zero");
        }
        if let Some(remote) = &self.remote {
            if !remote.base_url.starts_with("http://") && !remote.base_url.starts_with("https://") {
                bail!("remote.base_url must be an http(s) URL: {}", remote.base_url);
            }
            if remote.api_key.is_empty() || remote.api_secret.is_empty() {
                bail!("remote.api_key and remote.api_secret are required");
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
