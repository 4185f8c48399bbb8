//! Inbound message interception.
//!
//! # Responsibilities
//! - Enumerate the control identifiers the reader recognizes
//! - Map each control identifier to a registered handler
//! - Leave every other identifier to the application
//!
//! # Design Decisions
//! - Control identifiers form a closed enum; handlers are pluggable
//! - An identifier without a registered handler is ordinary traffic
//! - Handlers run inline on the reader, so they observe per-connection order

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::relay::error::InterceptError;
use crate::relay::message::{Message, MsgId};

/// Control identifiers recognized by the reader pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    /// Peer presents an opaque token to be exchanged for an identity.
    Token,
}

impl ControlId {
    pub const ALL: [ControlId; 1] = [ControlId::Token];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlId::Token => "token",
        }
    }

    /// Classify a message identifier.
    pub fn parse(id: &MsgId) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == id.as_str())
    }
}

impl std::fmt::Display for ControlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler for one control identifier.
///
/// On success the returned reply is delivered to the application and sent back
/// to the peer. An error terminates the connection.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, message: &Message) -> Result<Message, InterceptError>;
}

/// Registry of interceptors keyed by control identifier.
#[derive(Clone, Default)]
pub struct Interceptors {
    handlers: HashMap<ControlId, Arc<dyn Interceptor>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `control`, replacing any previous one.
    pub fn register(&mut self, control: ControlId, handler: impl Interceptor + 'static) -> &mut Self {
        self.handlers.insert(control, Arc::new(handler));
        self
    }

    /// Builder-style [`Interceptors::register`].
    pub fn with(mut self, control: ControlId, handler: impl Interceptor + 'static) -> Self {
        self.register(control, handler);
        self
    }

    /// Find the handler responsible for `id`, if any.
    pub fn route(&self, id: &MsgId) -> Option<(ControlId, &Arc<dyn Interceptor>)> {
        let control = ControlId::parse(id)?;
        self.handlers.get(&control).map(|handler| (control, handler))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
