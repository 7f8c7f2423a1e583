//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Check cross-field bounds (long-poll fits inside the request timeout)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::Config;

/// A single semantic problem with a named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check a parsed configuration.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    let reconcile = &config.reconcile;
    if reconcile.interval_secs == 0 {
        errors.push(ValidationError::new("reconcile.interval_secs", "must be greater than 0"));
    }
    if reconcile.provider_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "reconcile.provider_timeout_secs",
            "must be greater than 0",
        ));
    }
    if reconcile.long_poll_secs == 0 {
        errors.push(ValidationError::new("reconcile.long_poll_secs", "must be greater than 0"));
    }
    if reconcile.long_poll_secs >= config.listener.request_timeout_secs {
        errors.push(ValidationError::new(
            "reconcile.long_poll_secs",
            format!(
                "must be less than listener.request_timeout_secs ({})",
                config.listener.request_timeout_secs
            ),
        ));
    }
    if reconcile.namespace.is_empty() || reconcile.namespace.contains('.') {
        errors.push(ValidationError::new(
            "reconcile.namespace",
            "must be a single non-empty label segment",
        ));
    }

    if config.template.path.as_os_str().is_empty() {
        errors.push(ValidationError::new("template.path", "must not be empty"));
    }

    if config.haproxy.manage && config.haproxy.config_path.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "haproxy.config_path",
            "required when haproxy.manage is set",
        ));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("`{}` is not one of {}", observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
