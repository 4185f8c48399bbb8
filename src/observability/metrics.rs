//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connections_total` (counter): sessions upgraded
//! - `relay_active_connections` (gauge): sessions currently live
//! - `relay_pump_exit_total` (counter): pump exits by `pump` and `reason`
//! - `relay_messages_total` (counter): messages by `direction`
//! - `relay_send_buffer_full_total` (counter): sends rejected for a full buffer
//! - `relay_handshake_rejected_total` (counter): refused upgrades by `status`
//! - `relay_intercepted_total` (counter): control messages by `control` and `outcome`
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened() {
    counter!("relay_connections_total").increment(1);
    gauge!("relay_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("relay_active_connections").decrement(1.0);
}

/// `reason` is `None` for a normal stop.
pub fn record_pump_exit(pump: &'static str, reason: Option<&'static str>) {
    counter!(
        "relay_pump_exit_total",
        "pump" => pump,
        "reason" => reason.unwrap_or("normal")
    )
    .increment(1);
}

pub fn record_message(direction: &'static str) {
    counter!("relay_messages_total", "direction" => direction).increment(1);
}

pub fn record_send_buffer_full() {
    counter!("relay_send_buffer_full_total").increment(1);
}

pub fn record_handshake_rejected(status: u16) {
    counter!("relay_handshake_rejected_total", "status" => status.to_string()).increment(1);
}

pub fn record_intercept(control: &'static str, outcome: &'static str) {
    counter!("relay_intercepted_total", "control" => control, "outcome" => outcome).increment(1);
}
