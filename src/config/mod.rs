mod loader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::router::{Server, Strategy};

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Status HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8077
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Server pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Static server list. When non-empty the store is never consulted.
    #[serde(default)]
    pub servers: Vec<Server>,
    /// Strategy used by the `/servers/select` endpoint
    #[serde(default)]
    pub strategy: Strategy,
    /// Minimum seconds between two store fetches
    #[serde(default = "default_refresh_throttle")]
    pub refresh_throttle_seconds: u64,
}

fn default_refresh_throttle() -> u64 {
    30
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            strategy: Strategy::default(),
            refresh_throttle_seconds: default_refresh_throttle(),
        }
    }
}

/// Server store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// YAML file holding the server list
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Load polling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_max_jitter")]
    pub max_jitter_seconds: u64,
    /// Hard ceiling for a single load query
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_seconds: u64,
    /// Servers queried at once during a cycle
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_interval() -> u64 {
    120
}

fn default_max_jitter() -> u64 {
    60
}

fn default_rpc_timeout() -> u64 {
    300
}

fn default_concurrency() -> usize {
    1
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            max_jitter_seconds: default_max_jitter(),
            rpc_timeout_seconds: default_rpc_timeout(),
            concurrency: default_concurrency(),
            tls: None,
        }
    }
}

/// TLS configuration for SDK connections
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
}

/// Metric sinks configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub influxdb: InfluxDbConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

fn default_prometheus_enabled() -> bool {
    true
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

/// InfluxDB sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InfluxDbConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_influxdb_url")]
    pub url: String,
    #[serde(default = "default_influxdb_org")]
    pub org: String,
    #[serde(default = "default_influxdb_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub token: String,
}

fn default_influxdb_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_influxdb_org() -> String {
    "my-org".to_string()
}

fn default_influxdb_bucket() -> String {
    "sdk-router".to_string()
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_influxdb_url(),
            org: default_influxdb_org(),
            bucket: default_influxdb_bucket(),
            token: String::new(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.servers.is_empty() && self.store.path.is_none() {
            return Err(ConfigError::Validation(
                "either router.servers or store.path must be set".to_string(),
            ));
        }

        for server in &self.router.servers {
            validate_address(&server.address)?;
        }

        if self.poller.interval_seconds == 0 {
            return Err(ConfigError::Validation("poller.interval_seconds must be > 0".to_string()));
        }
        if self.poller.rpc_timeout_seconds == 0 {
            return Err(ConfigError::Validation("poller.rpc_timeout_seconds must be > 0".to_string()));
        }
        if self.poller.concurrency == 0 {
            return Err(ConfigError::Validation("poller.concurrency must be > 0".to_string()));
        }
        Ok(())
    }
}

fn validate_address(address: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(address)
        .map_err(|e| ConfigError::Validation(format!("invalid server address '{}': {}", address, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "server address '{}' must use http or https, not {}",
            address, other
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
