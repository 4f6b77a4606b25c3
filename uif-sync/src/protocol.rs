//! JSON text protocol carried in WebSocket text frames.
//!
//! ```text
//! client   ──► server   { "client_id": "...", "edits": [ EditCommand, ... ] }
//! server   ──► client   { "TextChanged": { "id", "text" } } | { "Clicked": { "id" } }
//!                       { "Ack": { "revision", "edits" } }   (opt-in)
//!                       { "Rejected": { "index", "error" } }
//! server   ──► renderer { "Snapshot": { "revision", "edits" } }
//!                       { "Applied": { "revision", "client_id", "edits" } }
//! renderer ──► server   { "TextChanged": ... } | { "Clicked": ... }
//! ```
//!
//! Event ids are echoed verbatim so the client can match them against its own
//! dispatch table.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uif_core::{Ack, EditCommand, EventKind, Rejection, Transaction};

/// UI-generated event, routed back to the session that registered `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TextChanged { id: String, text: String },
    Clicked { id: String },
}

impl Event {
    pub fn text_changed(id: impl Into<String>, text: impl Into<String>) -> Self {
        Event::TextChanged {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn clicked(id: impl Into<String>) -> Self {
        Event::Clicked { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            Event::TextChanged { id, .. } | Event::Clicked { id } => id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::TextChanged { .. } => EventKind::Changed,
            Event::Clicked { .. } => EventKind::Clicked,
        }
    }
}

/// Outcome of a submitted transaction, sent to the submitting session only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ack(Ack),
    Rejected(Rejection),
}

/// Anything the server sends to an editing client.
///
/// Untagged so that events keep their exact `{ "TextChanged": ... }` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(Event),
    Reply(Reply),
}

/// Tree updates pushed to rendering consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMessage {
    /// Full tree as AppendChild edits in depth-first order.
    Snapshot {
        revision: u64,
        edits: Vec<EditCommand>,
    },
    /// One committed transaction.
    Applied {
        revision: u64,
        client_id: String,
        edits: Vec<EditCommand>,
    },
}

impl RenderMessage {
    pub fn revision(&self) -> u64 {
        match self {
            RenderMessage::Snapshot { revision, .. } | RenderMessage::Applied { revision, .. } => {
                *revision
            }
        }
    }
}

/// Text encoding shared by every message type on the wire.
pub trait WireMessage: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Any decode failure is a `MalformedMessage`: the protocol cannot resynchronize.
    fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

impl WireMessage for Transaction {}
impl WireMessage for Event {}
impl WireMessage for Reply {}
impl WireMessage for ServerMessage {}
impl WireMessage for RenderMessage {}

/// Protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("connection closed")]
    ConnectionClosed,
}
