//! Configuration schema definitions.
//!
//! This module defines the configuration of a service built on the handler
//! chain. All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlersConfig {
    /// Stamped on every access log record.
    pub service_name: String,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Diagnostics and access log settings.
    pub logging: LoggingConfig,

    /// Header redaction for access logs.
    pub redaction: RedactionConfig,

    /// Metrics exporter settings.
    pub metrics: MetricsConfig,

    /// Outbound client identification.
    pub client: ClientConfig,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            service_name: "http-handlers".to_string(),
            listener: ListenerConfig::default(),
            logging: LoggingConfig::default(),
            redaction: RedactionConfig::default(),
            metrics: MetricsConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Transport-level deadline for producing a response head.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Output format of crate diagnostics.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Diagnostics filter directive (overridden by `RUST_LOG`).
    pub level: String,

    /// Diagnostics output format.
    pub format: LogFormat,

    /// Minimum severity of access log records: trace, debug, info, warn or
    /// error.
    pub access_log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            access_log_level: "info".to_string(),
        }
    }
}

/// Header redaction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Also deny proxy and CDN bookkeeping headers.
    pub cdn_headers: bool,

    /// Additional header names never to log.
    pub deny_headers: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            cdn_headers: true,
            deny_headers: Vec::new(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Outbound client identification (`User-Agent`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub service_code: String,
    pub version: String,

    /// Optional runbook URL appended to the `User-Agent`.
    pub runbook: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_code: "http-handlers".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            runbook: String::new(),
        }
    }
}
