//! Reader and writer pumps.
//!
//! # Responsibilities
//! - Reader: decode frames into messages, run interceptors, feed the inbound channel
//! - Writer: drain the outbound channel into frames, emit liveness pings
//! - Tear the session down when either side fails
//!
//! # Liveness
//! ```text
//! writer ── Ping every ping_period ──▶ peer
//! reader ◀── Pong ─────────────────── peer   (read deadline = last pong + pong_wait)
//! ```
//!
//! # Design Decisions
//! - Both pumps observe one cancellation token; whichever stops first cancels it
//! - Cancelling is the session close and may happen any number of times
//! - The reader only holds a weak sender to the outbound channel, so the
//!   application alone decides when outbound is closed

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message as WsMessage;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ConnectionConfig;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::relay::error::ConnectionError;
use crate::relay::intercept::Interceptors;
use crate::relay::message::Message;

/// The two pumps serving one [`crate::relay::Connection`].
pub struct Pumps {
    id: ConnectionId,
    reader: Reader,
    writer: Writer,
}

impl Pumps {
    pub(crate) fn new(
        id: ConnectionId,
        config: &ConnectionConfig,
        interceptors: Arc<Interceptors>,
        inbound: mpsc::Sender<Message>,
        outbound_weak: mpsc::WeakSender<Message>,
        outbound: mpsc::Receiver<Message>,
        done: CancellationToken,
    ) -> Self {
        Self {
            id,
            reader: Reader {
                id,
                inbound,
                outbound: outbound_weak,
                interceptors,
                pong_wait: config.pong_wait(),
                done: done.clone(),
            },
            writer: Writer {
                id,
                outbound,
                ping_period: config.ping_period(),
                write_wait: config.write_wait(),
                done,
            },
        }
    }

    /// Spawn the writer on `sink`, run the reader on `stream` until it stops,
    /// then wait for the writer to finish.
    pub async fn run<K, S>(self, sink: K, stream: S)
    where
        K: Sink<WsMessage, Error = axum::Error> + Unpin + Send + 'static,
        S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin + Send,
    {
        let writer = tokio::spawn(self.writer.run(sink).in_current_span());
        self.reader.run(stream).await;

        if let Err(e) = writer.await {
            tracing::error!(connection_id = %self.id, error = %e, "Writer task failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn drain_outbound(&mut self) -> Vec<Message> {
        let mut drained = Vec::new();
        while let Ok(message) = self.writer.outbound.try_recv() {
            drained.push(message);
        }
        drained
    }
}

struct Reader {
    id: ConnectionId,
    inbound: mpsc::Sender<Message>,
    outbound: mpsc::WeakSender<Message>,
    interceptors: Arc<Interceptors>,
    pong_wait: Duration,
    done: CancellationToken,
}

impl Reader {
    async fn run<S>(self, stream: S)
    where
        S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
    {
        let result = self.pump(stream).await;
        match &result {
            Ok(()) => tracing::debug!(connection_id = %self.id, "Reader stopped"),
            Err(e) => tracing::warn!(connection_id = %self.id, error = %e, "Reader failed"),
        }
        metrics::record_pump_exit("reader", result.as_ref().err().map(ConnectionError::kind));

        self.done.cancel();
        // Dropping `self` closes the inbound channel.
    }

    async fn pump<S>(&self, mut stream: S) -> Result<(), ConnectionError>
    where
        S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
    {
        let mut deadline = Instant::now() + self.pong_wait;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.done.cancelled() => return Ok(()),
                next = time::timeout_at(deadline, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => return Err(ConnectionError::ReadTimeout(self.pong_wait)),
                Ok(None) => {
                    tracing::debug!(connection_id = %self.id, "Peer went away");
                    return Ok(());
                }
                Ok(Some(frame)) => frame?,
            };

            let decoded = match frame {
                WsMessage::Text(text) => Message::from_json(text.as_str()),
                WsMessage::Binary(bytes) => Message::from_slice(&bytes),
                WsMessage::Pong(_) => {
                    deadline = Instant::now() + self.pong_wait;
                    continue;
                }
                WsMessage::Ping(_) => continue,
                WsMessage::Close(frame) => {
                    tracing::debug!(connection_id = %self.id, ?frame, "Peer closed");
                    return Ok(());
                }
            };
            let message = decoded.map_err(ConnectionError::Decode)?;

            metrics::record_message("inbound");
            self.dispatch(message).await?;
        }
    }

    async fn dispatch(&self, message: Message) -> Result<(), ConnectionError> {
        let Some((control, handler)) = self.interceptors.route(message.id()) else {
            return self.deliver(message).await;
        };

        let outcome = tokio::select! {
            biased;
            _ = self.done.cancelled() => return Ok(()),
            outcome = handler.intercept(&message) => outcome,
        };
        let reply = match outcome {
            Ok(reply) => {
                metrics::record_intercept(control.as_str(), "ok");
                reply
            }
            Err(source) => {
                metrics::record_intercept(control.as_str(), "error");
                return Err(ConnectionError::Intercept {
                    control: control.as_str(),
                    source,
                });
            }
        };

        tracing::debug!(connection_id = %self.id, %control, reply = %reply.id(), "Control message handled");
        self.deliver(reply.clone()).await?;
        self.reply(reply).await;
        Ok(())
    }

    /// Hand a message to the application, waiting for room in the inbound buffer.
    async fn deliver(&self, message: Message) -> Result<(), ConnectionError> {
        tokio::select! {
            biased;
            _ = self.done.cancelled() => Ok(()),
            sent = self.inbound.send(message) => sent.map_err(|_| ConnectionError::InboundClosed),
        }
    }

    /// Queue an interceptor reply for the peer, waiting for room if needed.
    async fn reply(&self, message: Message) {
        let Some(outbound) = self.outbound.upgrade() else {
            tracing::debug!(connection_id = %self.id, "Outbound closed, dropping reply");
            return;
        };

        tokio::select! {
            biased;
            _ = self.done.cancelled() => {}
            sent = outbound.send(message) => {
                if sent.is_err() {
                    tracing::debug!(connection_id = %self.id, "Writer gone, dropping reply");
                }
            }
        }
    }
}

struct Writer {
    id: ConnectionId,
    outbound: mpsc::Receiver<Message>,
    ping_period: Duration,
    write_wait: Duration,
    done: CancellationToken,
}

impl Writer {
    async fn run<K>(mut self, sink: K)
    where
        K: Sink<WsMessage, Error = axum::Error> + Unpin,
    {
        let result = self.pump(sink).await;
        match &result {
            Ok(()) => tracing::debug!(connection_id = %self.id, "Writer stopped"),
            Err(e) => tracing::warn!(connection_id = %self.id, error = %e, "Writer failed"),
        }
        metrics::record_pump_exit("writer", result.as_ref().err().map(ConnectionError::kind));

        self.done.cancel();
    }

    async fn pump<K>(&mut self, mut sink: K) -> Result<(), ConnectionError>
    where
        K: Sink<WsMessage, Error = axum::Error> + Unpin,
    {
        let mut ticker = time::interval_at(Instant::now() + self.ping_period, self.ping_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.done.cancelled() => return Ok(()),
                next = self.outbound.recv() => match next {
                    Some(message) => {
                        let text = message.to_json().map_err(ConnectionError::Encode)?;
                        write(&mut sink, WsMessage::Text(text.into()), self.write_wait).await?;
                        metrics::record_message("outbound");
                    }
                    None => {
                        tracing::debug!(connection_id = %self.id, "Outbound closed, sending close frame");
                        return write(&mut sink, WsMessage::Close(None), self.write_wait).await;
                    }
                },
                _ = ticker.tick() => {
                    write(&mut sink, WsMessage::Ping(Bytes::new()), self.write_wait).await?;
                }
            }
        }
    }
}

/// Write one frame, failing if it does not complete within `write_wait`.
async fn write<K>(sink: &mut K, frame: WsMessage, write_wait: Duration) -> Result<(), ConnectionError>
where
    K: Sink<WsMessage, Error = axum::Error> + Unpin,
{
    match time::timeout(write_wait, sink.send(frame)).await {
        Ok(sent) => sent.map_err(ConnectionError::from),
        Err(_) => Err(ConnectionError::WriteTimeout(write_wait)),
    }
}
