//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listen address (unix:/path or host:port)
//!     → listener.rs (bind, stale socket cleanup)
//!     → HTTP layer upgrades sessions
//!     → connection.rs (session id, live-session tracking)
//!     → listener.rs (bounded accept queue → application)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents unbounded pending sessions
//! - Each session tracked until its task ends

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{BoundSocket, ListenAddr, Listener, ListenerError};
