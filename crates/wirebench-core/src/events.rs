//! Session events.
//!
//! Adapters emit [`EventPayload`]s; the multiplexer stamps them with the
//! owning session id and a per-session sequence number to form a
//! [`SessionEvent`]. Terminal contract per session:
//!
//! ```text
//! Started → (Progress | StatusChanged | MessageReceived)* → Closed
//!                                                         | Error(failure)
//! ```
//!
//! `Error(Cancelled)` precedes `Closed { reason: Cancelled }`.
//! `Error(OverflowDropped)` can appear anywhere and is never terminal.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::errors::ErrorKind;
use crate::ids::SessionId;

/// Decoded GraphQL response envelope. Fields are kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GraphQlEnvelope {
    /// `data` member, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// `errors` member, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    /// `extensions` member, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlEnvelope {
    /// Whether the server reported GraphQL errors.
    pub fn has_errors(&self) -> bool {
        self.errors
            .as_ref()
            .is_some_and(|e| !e.is_null() && e.as_array().is_none_or(|a| !a.is_empty()))
    }
}

/// Incremental result content.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "chunk", rename_all = "snake_case")]
pub enum Progress {
    /// Full HTTP response body.
    Body {
        /// Raw bytes as received.
        #[serde(serialize_with = "serialize_lossy")]
        bytes: Bytes,
        /// Response `Content-Type`, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    /// GraphQL envelope.
    Envelope(GraphQlEnvelope),
    /// Local echo of a text frame we just sent.
    Echo {
        /// Sent text.
        text: String,
    },
}

fn serialize_lossy<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// Response status line plus metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusInfo {
    /// HTTP status code.
    pub code: u16,
    /// Canonical reason phrase, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Time from send to last body byte.
    pub elapsed_ms: u64,
}

/// Why a session closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CloseReason {
    /// The operation finished normally.
    Completed,
    /// The user cancelled.
    Cancelled,
    /// The user disconnected a WebSocket.
    LocalClose,
    /// The WebSocket peer closed or the stream ended.
    PeerClosed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason text (may be empty).
        text: String,
    },
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The adapter began work (request sent / socket connected).
    Started,
    /// A result chunk.
    Progress(Progress),
    /// A response status arrived.
    StatusChanged(StatusInfo),
    /// An inbound WebSocket text frame.
    MessageReceived {
        /// Frame text.
        text: String,
    },
    /// Something went wrong (or was cancelled / dropped).
    Error {
        /// Normalised class.
        kind: ErrorKind,
        /// Human-readable detail.
        detail: String,
    },
    /// The session finished.
    Closed(CloseReason),
}

impl EventPayload {
    /// Shorthand for an `Error` payload.
    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Error {
            kind,
            detail: detail.into(),
        }
    }

    /// Whether this payload ends the session.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Closed(_) => true,
            Self::Error { kind, .. } => kind.is_failure(),
            _ => false,
        }
    }

    /// Short type string for logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress(_) => "progress",
            Self::StatusChanged(_) => "status_changed",
            Self::MessageReceived { .. } => "message_received",
            Self::Error { .. } => "error",
            Self::Closed(_) => "closed",
        }
    }
}

/// An event stamped with its session and per-session order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Owning session.
    pub session_id: SessionId,
    /// Per-session sequence number, starting at 1.
    pub seq: u64,
    /// When the adapter emitted it.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl SessionEvent {
    /// Whether this event ends its session.
    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }

    /// Whether this is a synthesized overflow marker.
    pub fn is_overflow_marker(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::Error {
                kind: ErrorKind::OverflowDropped,
                ..
            }
        )
    }
}
