use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// --- DATA STRUCTURES ---

/// What `add_to_timeline` does with a cut whose start lies after its end.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CutMarkPolicy {
    /// Keep the marks as captured; the clip gets a negative duration.
    #[default]
    Allow,
    /// Exchange start and end.
    Swap,
    /// Refuse to add the clip.
    Reject,
}

impl FromStr for CutMarkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "swap" => Ok(Self::Swap),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown cut policy '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub poll_interval_ms: u64,
    pub seek_step_secs: f64,
    pub request_timeout_secs: u64,
    pub cut_policy: CutMarkPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            poll_interval_ms: 1000,
            seek_step_secs: 5.0,
            request_timeout_secs: 30,
            cut_policy: CutMarkPolicy::Allow,
        }
    }
}

impl ClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
}

// --- MANAGER ---

pub const CONFIG_FILE_ENV: &str = "CUTDESK_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "cutdesk.json";

pub struct ConfigManager {
    config: ClientConfig,
    file_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Loads `.env`, then the JSON config file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_path = std::env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = Self::read_file(&file_path)?;
        apply_overrides(&mut config, |key| std::env::var(key).ok())?;

        info!("[Config] API at {}", config.api_url);
        Ok(Self {
            config,
            file_path: Some(file_path),
        })
    }

    pub fn new_in_memory(config: ClientConfig) -> Self {
        Self {
            config,
            file_path: None,
        }
    }

    /// A missing file yields the defaults; an unreadable or invalid one is an error.
    pub fn read_file(path: &Path) -> Result<ClientConfig, ConfigError> {
        if !path.exists() {
            debug!("[Config] {:?} not found, using defaults", path);
            return Ok(ClientConfig::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

/// Applies `CUTDESK_*` overrides read through `lookup`.
pub fn apply_overrides<F>(config: &mut ClientConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("CUTDESK_API_URL") {
        config.api_url = url;
    }
    if let Some(value) = lookup("CUTDESK_POLL_INTERVAL_MS") {
        config.poll_interval_ms = parse_env("CUTDESK_POLL_INTERVAL_MS", value)?;
    }
    if let Some(value) = lookup("CUTDESK_SEEK_STEP") {
        config.seek_step_secs = parse_env("CUTDESK_SEEK_STEP", value)?;
    }
    if let Some(value) = lookup("CUTDESK_TIMEOUT_SECS") {
        config.request_timeout_secs = parse_env("CUTDESK_TIMEOUT_SECS", value)?;
    }
    if let Some(value) = lookup("CUTDESK_CUT_POLICY") {
        config.cut_policy = parse_env("CUTDESK_CUT_POLICY", value)?;
    }
    Ok(())
}
