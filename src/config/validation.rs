//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, levels and header names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HandlersConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::HeaderName;

use crate::config::schema::HandlersConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem.
pub fn validate_config(config: &HandlersConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.trim().is_empty() {
        errors.push(ValidationError::new("service_name", "must not be empty"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    if tracing::Level::from_str(&config.logging.access_log_level).is_err() {
        errors.push(ValidationError::new(
            "logging.access_log_level",
            format!("unknown level {:?}", config.logging.access_log_level),
        ));
    }

    for name in &config.redaction.deny_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "redaction.deny_headers",
                format!("invalid header name {name:?}"),
            ));
        }
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("invalid socket address {:?}", config.metrics.address),
        ));
    }

    if config.client.service_code.is_empty() {
        errors.push(ValidationError::new("client.service_code", "must not be empty"));
    }
    if config.client.version.is_empty() {
        errors.push(ValidationError::new("client.version", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
