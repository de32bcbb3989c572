//! CLI configuration management

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::inspector::DEFAULT_LIVE_CAPACITY;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chissl")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chissl")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("inspect.yml")
}

/// Main configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Capture service URL (default: http://127.0.0.1:8080)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Basic auth credentials (format: user:password)
    #[serde(default)]
    pub auth: Option<String>,

    /// Live events kept per session
    #[serde(default = "default_live_buffer_capacity")]
    pub live_buffer_capacity: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Dashboard stats refresh period
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_live_buffer_capacity() -> usize {
    DEFAULT_LIVE_CAPACITY
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_stats_interval_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            auth: None,
            live_buffer_capacity: default_live_buffer_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        let path = config_file();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, server: Option<String>, auth: Option<String>) -> Self {
        if let Some(server) = server {
            self.server_url = server;
        }
        if auth.is_some() {
            self.auth = auth;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}
