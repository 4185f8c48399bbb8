//! Application-facing connection handle.
//!
//! # Responsibilities
//! - Admit outbound messages without ever blocking the caller
//! - Hand inbound messages to the application in arrival order
//! - Expose connection death as inbound channel closure
//!
//! # Data Flow
//! ```text
//! send() ──try_send──▶ outbound (bounded) ──▶ writer pump ──▶ peer
//! receive() ◀──recv── inbound (bounded) ◀── reader pump ◀── peer
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::relay::error::SendError;
use crate::relay::intercept::Interceptors;
use crate::relay::message::{Message, MsgId};
use crate::relay::pump::Pumps;

/// One relayed WebSocket session, as seen by the application.
///
/// Dropping the connection (or calling [`Connection::close`]) makes the writer
/// send a close frame and shut the session down.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    sender: ConnectionSender,
    receiver: ConnectionReceiver,
    done: CancellationToken,
}

impl Connection {
    /// Create a connection and the pumps that will serve it.
    ///
    /// Buffer sizes come from `config` and must be non-zero.
    pub fn open(
        id: ConnectionId,
        config: &ConnectionConfig,
        interceptors: Arc<Interceptors>,
    ) -> (Self, Pumps) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.receive_buffer);
        let done = CancellationToken::new();

        let pumps = Pumps::new(
            id,
            config,
            interceptors,
            inbound_tx,
            outbound_tx.downgrade(),
            outbound_rx,
            done.clone(),
        );

        let connection = Self {
            id,
            sender: ConnectionSender {
                id,
                outbound: Some(outbound_tx),
            },
            receiver: ConnectionReceiver { inbound: inbound_rx },
            done,
        };
        (connection, pumps)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Serialize `payload` and queue it for the peer. See [`ConnectionSender::send`].
    pub fn send<T>(&self, id: impl Into<MsgId>, payload: &T) -> Result<(), SendError>
    where
        T: Serialize + ?Sized,
    {
        self.sender.send(id, payload)
    }

    /// Queue a prebuilt message for the peer.
    pub fn send_message(&self, message: Message) -> Result<(), SendError> {
        self.sender.send_message(message)
    }

    /// Wait for the next inbound message. `None` once the reader has stopped
    /// and everything it delivered has been consumed.
    pub async fn receive(&mut self) -> Option<Message> {
        self.receiver.receive().await
    }

    /// Stop sending. The writer flushes a close frame and the session ends.
    pub fn close(&mut self) {
        self.sender.close();
    }

    /// Whether either pump has stopped.
    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Separate the sending and receiving halves so they can live on different tasks.
    pub fn split(self) -> (ConnectionSender, ConnectionReceiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half of a [`Connection`].
///
/// The writer sends its close frame once every clone has been closed or dropped.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    id: ConnectionId,
    outbound: Option<mpsc::Sender<Message>>,
}

impl ConnectionSender {
    /// Serialize `payload` under `id` and try to queue it.
    ///
    /// Never waits for buffer space: a full buffer yields
    /// [`SendError::BufferFull`] and leaves queued messages untouched.
    pub fn send<T>(&self, id: impl Into<MsgId>, payload: &T) -> Result<(), SendError>
    where
        T: Serialize + ?Sized,
    {
        let message = Message::new(id, payload)?;
        self.send_message(message)
    }

    /// Try to queue a prebuilt message.
    pub fn send_message(&self, message: Message) -> Result<(), SendError> {
        let outbound = self.outbound.as_ref().ok_or(SendError::Closed)?;
        match outbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::debug!(connection_id = %self.id, id = %message.id(), "Send buffer full");
                metrics::record_send_buffer_full();
                Err(SendError::BufferFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Release this handle's hold on the outbound channel.
    pub fn close(&mut self) {
        self.outbound = None;
    }
}

/// Receiving half of a [`Connection`].
///
/// Dropping it while the peer is still sending tears the connection down.
#[derive(Debug)]
pub struct ConnectionReceiver {
    inbound: mpsc::Receiver<Message>,
}

impl ConnectionReceiver {
    pub async fn receive(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(send_buffer: usize) -> ConnectionConfig {
        ConnectionConfig {
            send_buffer,
            receive_buffer: 4,
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn full_buffer_fails_fast_and_keeps_contents() {
        let (connection, mut pumps) =
            Connection::open(ConnectionId::next(), &config(2), Arc::new(Interceptors::new()));

        connection.send("a", &1).unwrap();
        connection.send("b", &2).unwrap();
        assert!(matches!(connection.send("c", &3), Err(SendError::BufferFull)));

        let queued = pumps.drain_outbound();
        let ids: Vec<_> = queued.iter().map(|m| m.id().as_str().to_string()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn encode_failure_is_distinct_from_buffer_full() {
        use std::collections::HashMap;

        let (connection, _pumps) =
            Connection::open(ConnectionId::next(), &config(1), Arc::new(Interceptors::new()));

        // Non-string map keys cannot be represented in JSON.
        let mut payload = HashMap::new();
        payload.insert((1, 2), "x");
        assert!(matches!(connection.send("bad", &payload), Err(SendError::Encode(_))));
    }

    #[tokio::test]
    async fn close_rejects_further_sends() {
        let (mut connection, _pumps) =
            Connection::open(ConnectionId::next(), &config(4), Arc::new(Interceptors::new()));
        connection.close();
        assert!(matches!(connection.send("a", &1), Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn send_after_writer_gone_reports_closed() {
        let (connection, pumps) =
            Connection::open(ConnectionId::next(), &config(4), Arc::new(Interceptors::new()));
        drop(pumps);
        assert!(matches!(connection.send("a", &1), Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn receive_reports_closed_after_reader_stops() {
        let (mut connection, pumps) =
            Connection::open(ConnectionId::next(), &config(4), Arc::new(Interceptors::new()));
        drop(pumps);
        assert!(connection.receive().await.is_none());
    }

    #[tokio::test]
    async fn split_halves_share_the_channels() {
        let (connection, mut pumps) =
            Connection::open(ConnectionId::next(), &config(4), Arc::new(Interceptors::new()));
        let (sender, _receiver) = connection.split();
        let clone = sender.clone();

        sender.send("a", "one").unwrap();
        clone.send("b", "two").unwrap();
        assert_eq!(pumps.drain_outbound().len(), 2);
    }
}
