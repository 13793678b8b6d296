//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! location, the refresh threshold, the routes that require a session, and the
//! last used username.
//!
//! Configuration is stored at `~/.config/folio/config.json`. A handful of
//! environment variables override it (see [`Config::apply_env`]).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "folio";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Renew this long before the session credential expires
pub const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 120;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Environment override for the API base URL
pub const ENV_API_URL: &str = "FOLIO_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub refresh_threshold_secs: u64,
    /// Route prefixes that require a session; leaving them on failure
    /// redirects to `signin_path`.
    pub privileged_prefixes: Vec<String>,
    pub signin_path: String,
    pub session_cookie: String,
    pub refresh_cookie: String,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            privileged_prefixes: vec!["/admin".to_string()],
            signin_path: "/signin".to_string(),
            session_cookie: "token".to_string(),
            refresh_cookie: "refreshToken".to_string(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    /// Check whether a navigation path requires a session
    pub fn is_privileged(&self, path: &str) -> bool {
        self.privileged_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh_threshold(), Duration::from_secs(120));
        assert_eq!(config.signin_path, "/signin");
        assert_eq!(config.session_cookie, "token");
        assert_eq!(config.refresh_cookie, "refreshToken");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"refresh_threshold_secs": 60}"#)
            .expect("partial config should parse");
        assert_eq!(config.refresh_threshold_secs, 60);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.privileged_prefixes, vec!["/admin".to_string()]);
    }

    #[test]
    fn test_is_privileged() {
        let mut config = Config::default();
        assert!(config.is_privileged("/admin"));
        assert!(config.is_privileged("/admin/inventory"));
        assert!(!config.is_privileged("/books/42"));
        assert!(!config.is_privileged("/"));

        config.privileged_prefixes.push("/warehouse".to_string());
        assert!(config.is_privileged("/warehouse/stock"));
    }
}
