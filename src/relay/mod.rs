//! Message relay subsystem.
//!
//! # Data Flow
//! ```text
//! Upgraded WebSocket
//!     → pump.rs (reader: frames → Message)
//!         → intercept.rs (control identifiers → registered handler → reply)
//!         → inbound channel → connection.rs (receive)
//!     ← pump.rs (writer: Message → frames, periodic pings)
//!         ← outbound channel ← connection.rs (send, non-blocking)
//! ```
//!
//! # Design Decisions
//! - Bounded channels in both directions
//! - Application sends fail fast when full; inbound delivery blocks the reader
//! - Any fatal pump error ends that connection only

pub mod connection;
pub mod error;
pub mod intercept;
pub mod message;
pub mod pump;
pub mod token;

pub use connection::{Connection, ConnectionReceiver, ConnectionSender};
pub use error::{ConnectionError, InterceptError, SendError};
pub use intercept::{ControlId, Interceptor, Interceptors};
pub use message::{Message, MsgId};
pub use pump::Pumps;
pub use token::TokenLookup;
