//! Service configuration.
//!
//! Loaded from YAML with `${VAR}` / `${VAR:-default}` environment
//! expansion, then validated. Every knob carries the default the service
//! ships with, so a minimal file only names the external endpoints.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::error::ConfigError;

/// Pre-compiled regex for environment variable expansion.
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppInfo,

    #[validate(nested)]
    pub store: StoreConfig,

    #[validate(nested)]
    pub enriched_content: EnrichedContentConfig,

    #[validate(nested)]
    pub writer: WriterConfig,

    #[validate(nested)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppInfo {
    #[serde(default = "default_app_name")]
    pub system_code: String,

    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            system_code: default_app_name(),
            name: default_app_name(),
            description: default_description(),
            port: default_port(),
        }
    }
}

/// Document store connection settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StoreConfig {
    /// Comma-separated `host:port` list.
    #[validate(custom(function = validate_host_port_list))]
    pub connection: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    /// Socket timeout for cursor reads.
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnrichedContentConfig {
    #[validate(url)]
    pub base_url: String,

    /// Values for the X-Policy header, comma separated.
    #[serde(default)]
    pub x_policy: Option<String>,

    #[serde(default)]
    pub authorization: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WriterConfig {
    #[validate(url)]
    pub base_url: String,

    #[validate(url)]
    pub health_url: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QueueConfig {
    #[validate(length(min = 1))]
    pub addresses: Vec<String>,

    pub group: String,

    pub topic: String,

    /// Regular expression gating which publication-event URIs are acted on.
    #[validate(custom(function = validate_whitelist))]
    pub whitelist: String,
}

impl QueueConfig {
    pub fn whitelist_regex(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self.whitelist)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Grace period between an UPDATE event and the enrich-and-upload.
    #[serde(default = "default_delay_secs")]
    pub delay_for_notification_secs: u64,

    /// Inter-task delay inside a bulk job's workers.
    #[serde(default)]
    pub content_retrieval_throttle_ms: u64,

    /// Bound on concurrently handled notifications.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Bulk job worker pool size.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_true")]
    pub incremental_export_enabled: bool,

    /// Timeout for a single upstream HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            delay_for_notification_secs: default_delay_secs(),
            content_retrieval_throttle_ms: 0,
            max_in_flight: default_max_in_flight(),
            worker_count: default_worker_count(),
            incremental_export_enabled: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ExportConfig {
    pub fn notification_delay(&self) -> Duration {
        Duration::from_secs(self.delay_for_notification_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.content_retrieval_throttle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_app_name() -> String {
    "content-exporter".to_string()
}

fn default_description() -> String {
    "Exports content from the document store and writes it to the blob store".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_collection() -> String {
    "content".to_string()
}

fn default_socket_timeout_secs() -> u64 {
    600
}

fn default_delay_secs() -> u64 {
    30
}

fn default_max_in_flight() -> usize {
    100
}

fn default_worker_count() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(raw);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

fn expand_env_vars(raw: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }
        })
        .into_owned()
}

fn validate_host_port_list(connection: &str) -> Result<(), ValidationError> {
    if connection.is_empty() {
        return Err(ValidationError::new("store_connection_missing"));
    }
    for address in connection.split(',') {
        let Some((host, port)) = address.rsplit_once(':') else {
            return Err(ValidationError::new("store_address_without_port"));
        };
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(ValidationError::new("store_address_invalid"));
        }
    }
    Ok(())
}

fn validate_whitelist(pattern: &str) -> Result<(), ValidationError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|_| ValidationError::new("whitelist_not_a_regex"))
}
