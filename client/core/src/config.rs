//! Client Configuration
//!
//! Configuration for the backend connection, loaded with the following
//! priority (highest first):
//!
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file lives at `$XDG_CONFIG_HOME/charla/client.toml`
//! (typically `~/.config/charla/client.toml`).
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "https://charla.example.com/api"
//! connect_timeout_ms = 5000
//! request_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the base URL
pub const ENV_BASE_URL: &str = "CHARLA_BASE_URL";
/// Environment variable overriding the connect timeout (milliseconds)
pub const ENV_CONNECT_TIMEOUT_MS: &str = "CHARLA_CONNECT_TIMEOUT_MS";
/// Environment variable overriding the per-request timeout (seconds)
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CHARLA_REQUEST_TIMEOUT_SECS";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Resolved client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the backend API, without a trailing slash
    pub base_url: String,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-request timeout in seconds for JSON endpoints
    ///
    /// The chat request deliberately carries no overall timeout: it would
    /// cut long streams short. Only the connect timeout applies there.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment variable overrides in place.
    fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(ms) = env_u64(ENV_CONNECT_TIMEOUT_MS) {
            self.connect_timeout_ms = ms;
        }
        if let Some(secs) = env_u64(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = secs;
        }
    }

    /// Merge values from a parsed TOML file over the defaults.
    fn merge_file(&mut self, file: ClientToml) {
        let Some(api) = file.api else { return };
        if let Some(base_url) = api.base_url {
            self.base_url = base_url;
        }
        if let Some(ms) = api.connect_timeout_ms {
            self.connect_timeout_ms = ms;
        }
        if let Some(secs) = api.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
    }
}

/// Parse an environment variable as `u64`, ignoring unset or garbage values.
fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

/// Top-level TOML configuration file structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// The `[api]` section
    pub api: Option<ApiToml>,
}

/// The `[api]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the backend API
    pub base_url: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Per-request timeout in seconds for JSON endpoints
    pub request_timeout_secs: Option<u64>,
}

/// Default configuration file path (`~/.config/charla/client.toml`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("charla").join("client.toml"))
}

/// Load configuration from a specific TOML file, with env overrides applied
/// on top.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed.
pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ClientToml = toml::from_str(&text)?;

    let mut config = ClientConfig::default();
    config.merge_file(file);
    config.apply_env();
    Ok(config)
}

/// Load configuration from the default path, falling back to env + defaults
/// when no file exists.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file exists but cannot be read or parsed.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    match default_config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Ok(ClientConfig::from_env()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"https://charla.example.com/api\"\nrequest_timeout_secs = 60"
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.base_url, "https://charla.example.com/api");
        assert_eq!(config.request_timeout_secs, 60);
        // Untouched values keep their defaults.
        assert_eq!(config.connect_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_from_path(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[api\nbase_url = 3").unwrap();
        let result = load_config_from_path(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_partial_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[api]\nconnect_timeout_ms = 250").unwrap();
        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.connect_timeout_ms, 250);
        assert_eq!(config.base_url, ClientConfig::default().base_url);
    }
}
