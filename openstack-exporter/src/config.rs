//! Configuration for the OpenStack exporter.

use openstack_exporter_common::{LoggingConfig, is_valid_metric_name, load_config, parse_config};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Common(#[from] openstack_exporter_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// OpenStack cloud credentials and endpoint selection.
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9180").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "openstack").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9180".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "openstack".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
        }
    }
}

/// Which catalog endpoint to use for service calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    #[default]
    Public,
    Internal,
    Admin,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Public => "public",
            Interface::Internal => "internal",
            Interface::Admin => "admin",
        }
    }
}

/// OpenStack cloud configuration (Keystone v3 password authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Cloud name, used in logs only.
    #[serde(default = "default_cloud_name")]
    pub name: String,

    /// Identity service URL, e.g. "https://keystone.example.com:5000".
    #[serde(default)]
    pub auth_url: String,

    #[serde(default)]
    pub username: String,

    /// Password. Falls back to `OS_PASSWORD` when empty.
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub project_name: String,

    #[serde(default = "default_domain")]
    pub user_domain_name: String,

    #[serde(default = "default_domain")]
    pub project_domain_name: String,

    /// Region used for catalog lookup (any region when unset).
    #[serde(default)]
    pub region_name: Option<String>,

    /// Endpoint interface used for catalog lookup.
    #[serde(default)]
    pub interface: Interface,

    /// HTTP request timeout (seconds) for identity and service calls.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_cloud_name() -> String {
    "default".to_string()
}

fn default_domain() -> String {
    "Default".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            name: default_cloud_name(),
            auth_url: String::new(),
            username: String::new(),
            password: String::new(),
            project_name: String::new(),
            user_domain_name: default_domain(),
            project_domain_name: default_domain(),
            region_name: None,
            interface: Interface::default(),
            timeout_secs: default_timeout(),
        }
    }
}

impl CloudConfig {
    /// Fill the password from `OS_PASSWORD` if it was left empty.
    pub fn apply_env(&mut self) {
        if self.password.is_empty()
            && let Ok(password) = std::env::var("OS_PASSWORD")
        {
            self.password = password;
        }
    }

    /// Check that enough is configured to authenticate.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        let required = [
            ("cloud.auth_url", &self.auth_url),
            ("cloud.username", &self.username),
            ("cloud.password", &self.password),
            ("cloud.project_name", &self.project_name),
        ];

        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Validation(format!("{} is required", field)));
            }
        }

        Ok(())
    }
}

impl ExporterConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if !self.prometheus.prefix.is_empty() && !is_valid_metric_name(&self.prometheus.prefix) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {}",
                self.prometheus.prefix
            )));
        }

        if !self.cloud.auth_url.is_empty()
            && !(self.cloud.auth_url.starts_with("http://")
                || self.cloud.auth_url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(format!(
                "auth_url must be an http(s) URL: {}",
                self.cloud.auth_url
            )));
        }

        if self.cloud.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
