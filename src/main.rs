//! WebSocket message relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                         RELAY                            │
//!   WebSocket     │  ┌──────────┐   ┌───────────┐   ┌────────────────────┐   │
//!   ──────────────┼─▶│   net    │──▶│   http    │──▶│  relay::Connection │   │
//!   peer          │  │ listener │   │  upgrade  │   │  reader ▸ inbound  │   │
//!   ◀─────────────┼──│          │   │           │   │  writer ◂ outbound │   │
//!                 │  └──────────┘   └───────────┘   └─────────┬──────────┘   │
//!                 │                                           │ accept queue │
//!                 │                                           ▼              │
//!                 │                                  ┌─────────────────┐     │
//!                 │                                  │   application   │     │
//!                 │                                  │  (echo, here)   │     │
//!                 │                                  └─────────────────┘     │
//!                 └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The bundled application logs every message and echoes ordinary traffic
//! back to the peer.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ws_relay::config::{load_config, RelayConfig};
use ws_relay::lifecycle::{signals, Shutdown};
use ws_relay::net::{BoundSocket, ListenAddr};
use ws_relay::observability::{logging, metrics};
use ws_relay::relay::{Connection, ControlId, Interceptors, MsgId, SendError, TokenLookup};
use ws_relay::Service;

/// How long shutdown waits for open sessions to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ws-relay")]
#[command(about = "WebSocket message relay", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address (`unix:/path` or `host:port`).
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    // Overrides are validated along with the rest when the service is built.
    if let Some(address) = args.address {
        config.listener.address = address;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("ws-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        address = %config.listener.address,
        route = %config.listener.route,
        accept_queue = config.listener.accept_queue,
        pong_wait_ms = config.connection.pong_wait_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let mut interceptors = Interceptors::new();
    if config.interceptor.token_enabled {
        let lookup = TokenLookup::from_config(&config.interceptor)?;
        tracing::info!(endpoint = %lookup.endpoint(), "Token interceptor enabled");
        interceptors.register(ControlId::Token, lookup);
    }
    if interceptors.is_empty() {
        tracing::info!("No interceptors registered, control messages are relayed as-is");
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let (service, mut listener) = Service::new(&config, interceptors)?;
    let addr: ListenAddr = config.listener.address.parse()?;
    let socket = BoundSocket::bind(&addr).await?;
    let tracker = service.tracker().clone();
    let server = tokio::spawn(service.serve(socket, shutdown.subscribe()));
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            next = listener.accept() => match next {
                Some(connection) => {
                    tokio::spawn(echo(connection));
                }
                None => break,
            },
            _ = stop.recv() => break,
        }
    }

    // Queued but unaccepted sessions end with the listener.
    drop(listener);
    if let Err(e) = server.await? {
        tracing::error!(address = %addr, error = %e, "Relay service failed");
    }
    if !tracker.wait_idle(DRAIN_TIMEOUT).await {
        tracing::warn!(open = tracker.active_count(), "Sessions still open at exit");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn echo(mut connection: Connection) {
    let id = connection.id();
    tracing::info!(connection_id = %id, "Connection accepted");

    while let Some(message) = connection.receive().await {
        tracing::info!(
            connection_id = %id,
            id = %message.id(),
            payload = message.payload().unwrap_or("null"),
            "Message received"
        );

        // The relay has already answered the peer with its login reply.
        if message.id().as_str() == MsgId::LOGIN {
            continue;
        }

        match connection.send_message(message) {
            Ok(()) => {}
            Err(SendError::BufferFull) => {
                tracing::warn!(connection_id = %id, "Peer too slow, dropping echo");
            }
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Echo failed");
                break;
            }
        }
    }

    tracing::info!(connection_id = %id, "Connection closed");
}
