//! The message envelope exchanged with the engine.
//!
//! An envelope is a type tag, a correlation id, an optional payload and an
//! `async` flag. On the wire it is a JSON object with exactly those keys:
//!
//! ```text
//! {"type":"thread_start","id":17,"data":{"name":"main"},"async":true}
//! ```

use serde::{Deserialize, Serialize};

use crate::ids::CorrelationId;

/// Opaque key/value payload carried by an envelope.
pub type Payload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Payload>,
    #[serde(rename = "async", default)]
    is_async: bool,
}

impl Envelope {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        id: CorrelationId,
        data: Option<Payload>,
        is_async: bool,
    ) -> Self {
        Self {
            kind: kind.into(),
            id,
            data,
            is_async,
        }
    }

    /// An envelope for which no reply is tracked. The id is informational.
    #[must_use]
    pub fn fire_and_forget(
        kind: impl Into<String>,
        id: CorrelationId,
        data: Option<Payload>,
    ) -> Self {
        Self::new(kind, id, data, false)
    }

    /// An envelope whose sender expects a reply carrying the same id.
    #[must_use]
    pub fn correlated(kind: impl Into<String>, id: CorrelationId, data: Option<Payload>) -> Self {
        Self::new(kind, id, data, true)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    #[must_use]
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn into_data(self) -> Option<Payload> {
        self.data
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Whether this envelope can be matched against a pending request.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.is_async && !self.id.is_none()
    }

    /// Look up a string field in the payload.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

/// Envelope identity is its id and type; the payload is opaque.
impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl Eq for Envelope {}
