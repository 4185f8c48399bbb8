//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → serve loop stops accepting → sessions finish → accept() yields None
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
