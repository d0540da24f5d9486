//! Session kinds and the per-session lifecycle state machine.
//!
//! ```text
//! Pending ──► Open ──► Closed
//!    │          │  └──► Failed
//!    │          └──► Cancelling ──► Closed
//!    ├──► Cancelling
//!    ├──► Failed
//!    └──► Closed
//! ```
//!
//! `Closed` and `Failed` are terminal; no transition leaves them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which transport serves a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// One-shot HTTP request.
    HttpRequest,
    /// GraphQL query over HTTP.
    GraphQlQuery,
    /// Long-lived WebSocket connection.
    WebSocketConnection,
}

impl SessionKind {
    /// Short label for status displays.
    pub fn label(self) -> &'static str {
        match self {
            Self::HttpRequest => "http",
            Self::GraphQlQuery => "graphql",
            Self::WebSocketConnection => "ws",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created; the adapter has not reported `Started` yet.
    Pending,
    /// The adapter reported `Started`.
    Open,
    /// User cancellation requested; waiting for the adapter to unwind.
    Cancelling,
    /// Finished normally or after cancellation.
    Closed,
    /// Finished with a transport failure.
    Failed,
}

impl SessionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether the transition `self -> next` is allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Cancelling, Closed, Failed, Open, Pending};
        matches!(
            (self, next),
            (Pending, Open | Cancelling | Closed | Failed)
                | (Open, Cancelling | Closed | Failed)
                | (Cancelling, Closed)
        )
    }

    /// Lowercase label for status displays.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Cancelling => "cancelling",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
