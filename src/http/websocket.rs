//! WebSocket upgrade handling.
//!
//! # Responsibilities
//! - Reject requests that cannot become a WebSocket session
//! - Complete the upgrade with the configured read limit
//! - Wire each session to a Connection and run its pumps
//!
//! # Data Flow
//! ```text
//! GET /websocket/ (Upgrade) → 101 → Connection queued → writer spawned
//!                                                     → reader runs here until it stops
//! ```

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tracing::Instrument;

use crate::http::server::Service;
use crate::observability::metrics;
use crate::relay::Connection;

pub(crate) async fn upgrade_handler(
    State(service): State<Service>,
    method: Method,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if method != Method::GET {
        metrics::record_handshake_rejected(StatusCode::METHOD_NOT_ALLOWED.as_u16());
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected non-websocket request");
            metrics::record_handshake_rejected(StatusCode::BAD_REQUEST.as_u16());
            return (StatusCode::BAD_REQUEST, "Not a websocket handshake").into_response();
        }
    };

    let limit = service.inner.connection.max_message_size;
    upgrade
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_session(service, socket))
}

/// Run one upgraded session to completion.
async fn handle_session(service: Service, socket: WebSocket) {
    let guard = service.inner.tracker.track();
    let span = tracing::info_span!("connection", connection_id = %guard.id());

    async move {
        let state = &service.inner;
        let (connection, pumps) =
            Connection::open(guard.id(), &state.connection, Arc::clone(&state.interceptors));

        // Waits for a free slot while the application is slow to accept.
        if state.new_conn.send(connection).await.is_err() {
            tracing::warn!("Listener dropped, closing session");
            return;
        }
        tracing::debug!("Connection queued");

        let (sink, stream) = socket.split();
        pumps.run(sink, stream).await;

        tracing::debug!("Session ended");
        drop(guard);
    }
    .instrument(span)
    .await
}
