//! weaveproxy Configuration
//!
//! This module provides configuration structures for the Weave
//! storage-node proxy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main weaveproxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Inbound HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream authentication service configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Persistent node store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inbound HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the proxy listener
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Externally visible base URL handed to clients during node discovery.
    /// Derived from the request's Host header when unset.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Largest request body accepted for forwarding
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Upstream authentication service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base address of the authentication/discovery service
    #[serde(default = "default_auth_server")]
    pub auth_server: String,

    /// Timeout for every outbound request in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Persistent node store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which store keeps user → node records
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory holding the node database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Node store implementation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database under `data_dir`
    #[default]
    Sqlite,
    /// Process memory; every user is rediscovered after a restart
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_auth_server() -> String {
    "https://auth.services.mozilla.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/weaveproxy")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            auth_server: default_auth_server(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ProxyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config("server.bind_address cannot be empty".into()));
        }

        if !is_http_url(&self.upstream.auth_server) {
            return Err(crate::Error::Config(format!(
                "upstream.auth_server must be an http(s) URL, got {:?}",
                self.upstream.auth_server
            )));
        }

        if let Some(public_url) = &self.server.public_url {
            if !is_http_url(public_url) {
                return Err(crate::Error::Config(format!(
                    "server.public_url must be an http(s) URL, got {:?}",
                    public_url
                )));
            }
        }

        if self.upstream.timeout_secs == 0 {
            return Err(crate::Error::Config("upstream.timeout_secs must be positive".into()));
        }

        Ok(())
    }

    /// Get the upstream request timeout as Duration
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.data_dir
    }

    /// Get the node database path
    pub fn node_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("nodes.db")
    }
}

/// Whether `value` looks like an absolute http or https URL
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
