//! WebSocket message relay.
//!
//! Accepts WebSocket sessions, wraps each in a [`relay::Connection`] served by a
//! reader and a writer pump, and hands new connections to the application
//! through a bounded [`net::Listener`] queue.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;

pub use config::RelayConfig;
pub use http::{listen, Service};
pub use lifecycle::Shutdown;
pub use net::Listener;
pub use relay::{Connection, Message, MsgId, SendError};
