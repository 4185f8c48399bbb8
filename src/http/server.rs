//! Relay HTTP service.
//!
//! # Responsibilities
//! - Create the Axum Router with the single upgrade route
//! - Own the per-connection settings and interceptor registry
//! - Feed upgraded connections into the accept queue
//! - Serve on a TCP or Unix socket until shutdown

use std::sync::Arc;

use axum::{routing::any, Router};
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ConnectionConfig, RelayConfig};
use crate::http::websocket::upgrade_handler;
use crate::lifecycle::shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{accept_queue, BoundSocket, ListenAddr, Listener, ListenerError};
use crate::relay::{Connection, Interceptors};

/// Connection factory behind the upgrade route.
#[derive(Clone)]
pub struct Service {
    pub(crate) inner: Arc<ServiceState>,
}

pub(crate) struct ServiceState {
    pub(crate) route: String,
    pub(crate) connection: ConnectionConfig,
    pub(crate) interceptors: Arc<Interceptors>,
    pub(crate) new_conn: mpsc::Sender<Connection>,
    pub(crate) tracker: ConnectionTracker,
}

impl Service {
    /// Create the service and the listener its connections are delivered to.
    ///
    /// `config` is validated first; zero-sized queues or buffers are rejected.
    pub fn new(
        config: &RelayConfig,
        interceptors: Interceptors,
    ) -> Result<(Self, Listener), ListenerError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let (new_conn, listener) = accept_queue(config.listener.accept_queue);
        let service = Self {
            inner: Arc::new(ServiceState {
                route: config.listener.route.clone(),
                connection: config.connection.clone(),
                interceptors: Arc::new(interceptors),
                new_conn,
                tracker: ConnectionTracker::new(),
            }),
        };
        Ok((service, listener))
    }

    /// Build the router serving the upgrade route and everything below it.
    ///
    /// Can be merged into a larger application instead of using [`Service::serve`].
    pub fn router(&self) -> Router {
        let base = self.inner.route.trim_end_matches('/');
        Router::new()
            .route(&format!("{base}/"), any(upgrade_handler))
            .route(&format!("{base}/{{*rest}}"), any(upgrade_handler))
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Live session count tracker.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.inner.tracker
    }

    /// Serve on `socket` until `shutdown` fires.
    ///
    /// Sessions already upgraded keep running after the serve loop stops.
    pub async fn serve(
        self,
        socket: BoundSocket,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let router = self.router();
        let signal = shutdown::wait(shutdown);

        tracing::info!(route = %self.inner.route, "Relay service starting");
        match socket {
            BoundSocket::Tcp(listener) => {
                axum::serve(listener, router).with_graceful_shutdown(signal).await?;
            }
            #[cfg(unix)]
            BoundSocket::Unix { listener, path } => {
                let served = axum::serve(listener, router).with_graceful_shutdown(signal).await;
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::debug!(path = %path.display(), error = %e, "Socket file not removed");
                }
                served?;
            }
        }

        tracing::info!("Relay service stopped");
        Ok(())
    }
}

/// Bind the configured address, serve the relay in the background and return
/// the queue of new connections.
pub async fn listen(
    config: &RelayConfig,
    interceptors: Interceptors,
    shutdown: broadcast::Receiver<()>,
) -> Result<Listener, ListenerError> {
    let (service, listener) = Service::new(config, interceptors)?;
    let addr: ListenAddr = config.listener.address.parse()?;
    let socket = BoundSocket::bind(&addr).await?;

    tokio::spawn(async move {
        if let Err(e) = service.serve(socket, shutdown).await {
            tracing::error!(address = %addr, error = %e, "Relay service failed");
        }
    });

    Ok(listener)
}
