//! Global configuration parsing and the process-wide transport toggle.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::transport::TransportMode;
use crate::{AppError, Result};

/// Environment variable selecting the transport path (`stdio` or `http`).
pub const TRANSPORT_ENV: &str = "UNITY_MCP_TRANSPORT";

/// Environment variable overriding the plugin hub base URL.
pub const HUB_URL_ENV: &str = "UNITY_MCP_HUB_URL";

fn default_channel_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_http_port() -> u16 {
    8765
}

fn default_hub_url() -> String {
    "http://127.0.0.1:8787".into()
}

fn default_transport() -> String {
    "stdio".into()
}

/// Global configuration parsed from `config.toml`.
///
/// Every field carries a default so the server can start with no config
/// file at all; the TOML file only overrides what it names.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory scanned for Unity local-channel endpoints.
    ///
    /// On Unix this holds `UnityMCP.<hash>.sock` files; on Windows the
    /// pipe namespace is fixed and this value is ignored.
    #[serde(default = "default_channel_dir")]
    pub channel_dir: PathBuf,
    /// Port for the local HTTP surface (batch registration, execute).
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Base URL of the remote plugin hub.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    /// Transport path: `stdio` (local channels) or `http` (plugin hub).
    ///
    /// The `UNITY_MCP_TRANSPORT` environment variable takes precedence.
    #[serde(default = "default_transport")]
    pub transport: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            channel_dir: default_channel_dir(),
            http_port: default_http_port(),
            hub_url: default_hub_url(),
            transport: default_transport(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective hub base URL, preferring `UNITY_MCP_HUB_URL`.
    #[must_use]
    pub fn effective_hub_url(&self) -> String {
        env::var(HUB_URL_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.hub_url.clone())
    }

    /// Resolve the process-wide transport mode.
    ///
    /// The `UNITY_MCP_TRANSPORT` environment variable wins over the config
    /// file; anything other than `http` (case-insensitive) selects the
    /// local-channel path.
    #[must_use]
    pub fn transport_mode(&self) -> TransportMode {
        let raw = env::var(TRANSPORT_ENV).unwrap_or_else(|_| self.transport.clone());
        TransportMode::from_name(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.hub_url.is_empty() {
            return Err(AppError::Config("hub_url must not be empty".into()));
        }
        match self.transport.to_lowercase().as_str() {
            "stdio" | "http" => Ok(()),
            other => Err(AppError::Config(format!(
                "transport must be 'stdio' or 'http', got '{other}'"
            ))),
        }
    }
}
