//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (BEACON_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Administrative API configuration.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Seeded resource entitlements.
    #[serde(default)]
    pub access: Vec<AccessResource>,
}

/// One seeded resource entitlement.
///
/// Deployments feed the access policy from their own permission store;
/// this section exists for standalone setups and local development.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResource {
    /// Resource identifier (dashboard uid, document id, topic name).
    pub uid: String,

    /// Readable by everyone.
    #[serde(default)]
    pub public: bool,

    /// Users with read entitlement.
    #[serde(default)]
    pub viewers: Vec<i64>,

    /// Users with write entitlement.
    #[serde(default)]
    pub editors: Vec<i64>,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum subscriptions per session.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_session: usize,

    /// Maximum publish payload size in bytes.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Broadcast capacity per channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Administrative API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Base path of the channel admin API.
    #[serde(default = "default_admin_base")]
    pub base_path: String,
}

// Default value functions
fn default_host() -> String {
    std::env::var("BEACON_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("BEACON_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_max_payload_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_admin_base() -> String {
    "/admin/channels".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
            admin: AdminConfig::default(),
            access: Vec::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_session: default_max_subscriptions(),
            max_payload_size: default_max_payload_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            base_path: default_admin_base(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "beacon.toml",
            "/etc/beacon/beacon.toml",
            "~/.config/beacon/beacon.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert!(config.metrics.enabled);
        assert_eq!(config.admin.base_path, "/admin/channels");
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_subscriptions_per_session = 16
            max_payload_size = 1024
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_subscriptions_per_session, 16);
        assert_eq!(config.limits.max_payload_size, 1024);
        // Unspecified sections keep their defaults.
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_access_seeding() {
        let toml_str = r#"
            [[access]]
            uid = "d1"
            public = true
            editors = [7]

            [[access]]
            uid = "doc-1"
            viewers = [8, 9]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.access.len(), 2);
        assert!(config.access[0].public);
        assert_eq!(config.access[0].editors, vec![7]);
        assert_eq!(config.access[1].viewers, vec![8, 9]);
    }
}
