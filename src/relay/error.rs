//! Error definitions for the relay subsystem.

use thiserror::Error;

/// Why a pump stopped abnormally.
///
/// Every variant is fatal for the owning connection and for that connection only.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Read or write on the WebSocket failed.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// No pong arrived within the liveness window.
    #[error("no pong received within {0:?}")]
    ReadTimeout(std::time::Duration),

    /// A single frame write exceeded its deadline.
    #[error("write not completed within {0:?}")]
    WriteTimeout(std::time::Duration),

    /// An inbound frame was not a valid message envelope.
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The interceptor for a control message failed.
    #[error("interceptor for '{control}' failed: {source}")]
    Intercept {
        control: &'static str,
        #[source]
        source: InterceptError,
    },

    /// The application dropped its receiving side.
    #[error("inbound channel closed by the application")]
    InboundClosed,
}

impl ConnectionError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionError::Transport(_) => "transport",
            ConnectionError::ReadTimeout(_) => "read_timeout",
            ConnectionError::WriteTimeout(_) => "write_timeout",
            ConnectionError::Decode(_) => "decode",
            ConnectionError::Encode(_) => "encode",
            ConnectionError::Intercept { .. } => "intercept",
            ConnectionError::InboundClosed => "inbound_closed",
        }
    }
}

/// Failure of [`crate::relay::Connection::send`].
///
/// None of these tear the connection down; the caller decides whether to retry,
/// drop the message or close.
#[derive(Debug, Error)]
pub enum SendError {
    /// The outbound buffer is full; the peer is not keeping up.
    #[error("send buffer full")]
    BufferFull,

    /// The payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The writer has stopped or the outbound side was closed.
    #[error("connection closed")]
    Closed,
}

/// Failure of an inbound message interceptor.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The control payload did not match its schema.
    #[error("invalid payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// The external lookup failed or returned a non-success status.
    #[error("lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),

    /// The reply could not be serialized.
    #[error("failed to encode reply: {0}")]
    Encode(#[source] serde_json::Error),

    /// The interceptor could not be constructed.
    #[error("invalid interceptor setup: {0}")]
    Setup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_display() {
        assert_eq!(SendError::BufferFull.to_string(), "send buffer full");
        assert_eq!(SendError::Closed.to_string(), "connection closed");
    }

    #[test]
    fn connection_error_kinds() {
        let err = ConnectionError::ReadTimeout(std::time::Duration::from_secs(60));
        assert_eq!(err.kind(), "read_timeout");
        assert!(err.to_string().contains("60s"));

        let err = ConnectionError::Intercept {
            control: "token",
            source: InterceptError::Setup("no endpoint".into()),
        };
        assert_eq!(err.kind(), "intercept");
        assert!(err.to_string().contains("'token'"));
    }
}
