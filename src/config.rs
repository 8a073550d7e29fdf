use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::query::DEFAULT_PAGE_LIMIT;

/// Expand environment variables and tilde in a path string.
/// Supports: $HOME, ${VAR}, ~/path
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_server_selection_timeout() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    30
}

fn default_page_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Driver connect timeout per connection attempt.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long the driver may search for a reachable server.
    #[serde(default = "default_server_selection_timeout")]
    pub server_selection_timeout_secs: u64,

    /// Per-query timeout; elapse is reported to the caller as a timeout
    /// failure.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Page size used by document listing when the caller gives no limit.
    #[serde(default = "default_page_limit")]
    pub default_page_limit: i64,

    /// Optional override for the connection profiles file.
    #[serde(default)]
    pub profiles_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            server_selection_timeout_secs: default_server_selection_timeout(),
            query_timeout_secs: default_query_timeout(),
            default_page_limit: default_page_limit(),
            profiles_path: None,
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("mongodb-browser-mcp-rs");

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        Ok(config_dir)
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get data directory")?
            .join("mongodb-browser-mcp-rs");

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        }

        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load settings, falling back to defaults when no config file exists.
    /// Connections are supplied at runtime by the caller, so a missing file
    /// is not an error; an example is written for discoverability.
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if !config_file.exists() {
            Self::create_example_config(&config_file)?;
            tracing::info!(
                "No configuration found; using defaults. Example written to {}",
                config_file.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_file).context("Failed to read config file")?;

        let mut config: Self =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        // Expand environment variables and tilde in paths
        config.expand_paths();

        Ok(config)
    }

    fn create_example_config(config_file: &Path) -> Result<()> {
        let example_content = r"# mongodb-browser-mcp-rs configuration
# All settings are optional; the values below are the defaults.

# Driver connect timeout per connection attempt (seconds)
# connect_timeout_secs: 10

# How long the driver may search for a reachable server (seconds)
# server_selection_timeout_secs: 30

# Per-query timeout (seconds). Queries that run longer fail with a
# timeout error; nothing is retried.
# query_timeout_secs: 30

# Page size for document listing when the front-end sends no limit
# default_page_limit: 50

# Where connection profiles (saved name + connection string pairs) live.
# Defaults to profiles.yaml in the local data directory.
# WARNING: profiles contain connection strings, which may embed
# credentials - keep this file secure!
# profiles_path: ~/.local/share/mongodb-browser-mcp-rs/profiles.yaml
";

        fs::write(config_file, example_content).context("Failed to write example config file")?;

        Ok(())
    }

    /// Resolved location of the profiles file.
    pub fn profiles_file(&self) -> Result<PathBuf> {
        match &self.profiles_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("profiles.yaml")),
        }
    }

    /// Expand environment variables and tilde in all path fields
    fn expand_paths(&mut self) {
        if let Some(path) = &self.profiles_path {
            self.profiles_path = Some(expand_path(path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.server_selection_timeout_secs, 30);
        assert_eq!(config.query_timeout_secs, 30);
        assert_eq!(config.default_page_limit, DEFAULT_PAGE_LIMIT);
        assert!(config.profiles_path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_yaml::from_str("query_timeout_secs: 5\n").unwrap();
        assert_eq!(config.query_timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.default_page_limit, DEFAULT_PAGE_LIMIT);
    }
}
