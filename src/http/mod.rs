//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/Unix connection
//!     → server.rs (Axum setup, single upgrade route, serve loop)
//!     → websocket.rs (method/handshake checks, upgrade, session wiring)
//!     → relay subsystem (Connection + pumps)
//! ```

pub mod server;
pub mod websocket;

pub use server::{listen, Service};
