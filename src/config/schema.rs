//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listen address, upgrade route and accept queue.
    pub listener: ListenerConfig,

    /// Per-connection buffers, limits and liveness timing.
    pub connection: ConnectionConfig,

    /// Inbound message interceptors.
    pub interceptor: InterceptorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// `unix:/path/to.sock` or `host:port`.
    pub address: String,

    /// Path of the upgrade route; sub-paths are matched too.
    pub route: String,

    /// Capacity of the new-connection queue (backpressure on accept).
    pub accept_queue: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "unix:/tmp/ws-relay.sock".to_string(),
            route: "/websocket/".to_string(),
            accept_queue: 10,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Outbound (application → peer) buffer capacity.
    pub send_buffer: usize,

    /// Inbound (peer → application) buffer capacity.
    pub receive_buffer: usize,

    /// Largest accepted inbound message in bytes.
    pub max_message_size: usize,

    /// Deadline for a single frame write in milliseconds.
    pub write_wait_ms: u64,

    /// Time allowed between pongs before the peer is considered dead, in milliseconds.
    pub pong_wait_ms: u64,

    /// Ping interval in milliseconds. Must be shorter than `pong_wait_ms`.
    pub ping_period_ms: u64,
}

impl ConnectionConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            send_buffer: 256,
            receive_buffer: 256,
            max_message_size: 512,
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            ping_period_ms: 54_000, // 9/10 of pong_wait
        }
    }
}

/// Interceptor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Resolve `token` messages against `token_endpoint`.
    pub token_enabled: bool,

    /// Endpoint receiving `token=<value>` form posts.
    pub token_endpoint: String,

    /// Lookup request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            token_enabled: true,
            token_endpoint: "http://nerdhub.org/token".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for production.
    Json,
}
