//! Application-level message envelope.
//!
//! # Wire Shape
//! ```text
//! { "ID": "<identifier>", "Data": <raw JSON> }
//! ```
//!
//! The identifier selects the payload schema; the envelope never looks inside
//! `Data`. Payloads are kept as raw JSON and parsed on demand with
//! [`Message::decode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Application-defined message identifier (e.g. `"token"`, `"login"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(String);

impl MsgId {
    /// Identifier of the reply synthesized after a successful token lookup.
    pub const LOGIN: &'static str = "login";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn login() -> Self {
        Self::new(Self::LOGIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MsgId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MsgId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MsgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable `{id, payload}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "ID")]
    id: MsgId,
    #[serde(rename = "Data", default)]
    data: Option<Box<RawValue>>,
}

impl Message {
    /// Serialize `payload` and wrap it under `id`.
    pub fn new<T>(id: impl Into<MsgId>, payload: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self {
            id: id.into(),
            data: Some(serde_json::value::to_raw_value(payload)?),
        })
    }

    /// Wrap an already-serialized payload.
    pub fn from_raw(id: impl Into<MsgId>, data: Option<Box<RawValue>>) -> Self {
        Self { id: id.into(), data }
    }

    /// Decode an envelope from one frame's JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode an envelope from one frame's JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn id(&self) -> &MsgId {
        &self.id
    }

    /// Raw payload JSON, `None` when `Data` was null or absent.
    pub fn payload(&self) -> Option<&str> {
        self.data.as_deref().map(RawValue::get)
    }

    /// Parse the payload into the schema owned by this message's identifier.
    ///
    /// A missing payload decodes as JSON `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.payload().unwrap_or("null"))
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.payload() == other.payload()
    }
}

impl Eq for Message {}
