//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffers > 0, ping period inside the pong window)
//! - Check that addresses and endpoints parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::net::listener::ListenAddr;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if let Err(e) = listener.address.parse::<ListenAddr>() {
        errors.push(ValidationError::new("listener.address", e.to_string()));
    }
    if !listener.route.starts_with('/') {
        errors.push(ValidationError::new("listener.route", "must start with '/'"));
    }
    if listener.accept_queue == 0 {
        errors.push(ValidationError::new("listener.accept_queue", "must be greater than 0"));
    }

    let connection = &config.connection;
    let non_zero = [
        ("connection.send_buffer", connection.send_buffer as u64),
        ("connection.receive_buffer", connection.receive_buffer as u64),
        ("connection.max_message_size", connection.max_message_size as u64),
        ("connection.write_wait_ms", connection.write_wait_ms),
        ("connection.pong_wait_ms", connection.pong_wait_ms),
        ("connection.ping_period_ms", connection.ping_period_ms),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    if connection.ping_period_ms >= connection.pong_wait_ms {
        errors.push(ValidationError::new(
            "connection.ping_period_ms",
            format!(
                "must be shorter than pong_wait_ms ({} >= {})",
                connection.ping_period_ms, connection.pong_wait_ms
            ),
        ));
    }

    let interceptor = &config.interceptor;
    if interceptor.token_enabled {
        if let Err(e) = url::Url::parse(&interceptor.token_endpoint) {
            errors.push(ValidationError::new("interceptor.token_endpoint", e.to_string()));
        }
        if interceptor.timeout_ms == 0 {
            errors.push(ValidationError::new("interceptor.timeout_ms", "must be greater than 0"));
        }
    }

    let observability = &config.observability;
    if observability.log_level.parse::<tracing::Level>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
