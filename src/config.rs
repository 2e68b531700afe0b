use crate::error::{ErrorContext, IntakeError};
use crate::upload_queue::{PollRetryPolicy, PollSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SERVER_URL: &str = "FORENSICFLOW_SERVER_URL";
pub const ENV_API_TOKEN: &str = "FORENSICFLOW_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeConfig {
    pub server_url: Option<String>,
    pub api_token: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// `None` keeps retrying failed status fetches forever
    #[serde(default = "default_max_poll_failures")]
    pub max_consecutive_poll_failures: Option<u32>,
    #[serde(default = "default_max_poll_backoff_ms")]
    pub max_poll_backoff_ms: u64,
    #[serde(default = "default_max_poll_duration_secs")]
    pub max_poll_duration_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_poll_failures() -> Option<u32> {
    None
}

fn default_max_poll_backoff_ms() -> u64 {
    30_000
}

fn default_max_poll_duration_secs() -> Option<u64> {
    None
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_poll_failures: default_max_poll_failures(),
            max_poll_backoff_ms: default_max_poll_backoff_ms(),
            max_poll_duration_secs: default_max_poll_duration_secs(),
            request_timeout_secs: None,
        }
    }
}

impl IntakeConfig {
    /// Server URL without a trailing slash, or a config error if none is set
    pub fn require_server_url(&self) -> Result<String, IntakeError> {
        let url = self
            .server_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                IntakeError::Config(format!(
                    "No server URL configured (set serverUrl or {})",
                    ENV_SERVER_URL
                ))
            })?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(IntakeError::Config(format!(
                "Server URL must start with http:// or https://: {}",
                url
            )));
        }

        Ok(url.trim_end_matches('/').to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            // Backoff only applies once a failure cap is configured
            retry: match self.max_consecutive_poll_failures {
                Some(max) => PollRetryPolicy {
                    max_backoff: Duration::from_millis(self.max_poll_backoff_ms),
                    ..PollRetryPolicy::bounded(max)
                },
                None => PollRetryPolicy::unbounded(),
            },
            max_duration: self.max_poll_duration_secs.map(Duration::from_secs),
        }
    }

    /// Environment variables win over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            if !url.trim().is_empty() {
                self.server_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            if !token.trim().is_empty() {
                self.api_token = Some(token);
            }
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf, IntakeError> {
    dirs::home_dir()
        .map(|home| home.join(".forensicflow"))
        .ok_or_else(|| IntakeError::Config("Could not find home directory".to_string()))
}

pub fn get_config_file_path() -> Result<PathBuf, IntakeError> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn get_logs_dir() -> Result<PathBuf, IntakeError> {
    Ok(get_config_dir()?.join("logs"))
}

fn ensure_private_dir(dir: &Path) -> Result<(), IntakeError> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).context("Failed to create directory")?;

    // 700: owner only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

pub fn ensure_config_dir() -> Result<(), IntakeError> {
    ensure_private_dir(&get_config_dir()?)
}

pub fn ensure_logs_dir() -> Result<(), IntakeError> {
    ensure_private_dir(&get_logs_dir()?)
}

/// Load `~/.forensicflow/config.json`, falling back to defaults when absent
pub fn load_config() -> Result<IntakeConfig, IntakeError> {
    ensure_config_dir()?;
    load_config_from(&get_config_file_path()?)
}

pub fn load_config_from(path: &Path) -> Result<IntakeConfig, IntakeError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str::<IntakeConfig>(&content).context("Failed to parse config file")?
    } else {
        IntakeConfig::default()
    };

    config.apply_env_overrides();
    Ok(config)
}

pub fn save_config(config: &IntakeConfig) -> Result<(), IntakeError> {
    ensure_config_dir()?;
    save_config_to(config, &get_config_file_path()?)
}

pub fn save_config_to(config: &IntakeConfig, path: &Path) -> Result<(), IntakeError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).context("Failed to write config file")?;

    // 600: the file holds the API token
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
