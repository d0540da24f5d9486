//! Error taxonomy shared by every crate.
//!
//! - [`ErrorKind`]: transport-level failure classes carried inside
//!   `Error` events. These never cross into the presentation layer as
//!   `Result`s.
//! - [`DescriptorError`]: malformed user input, rejected before a session
//!   exists.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// ErrorKind
// ─────────────────────────────────────────────────────────────────────────────

/// Normalised failure class for an `Error` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// DNS, TCP or TLS failure, or the connection dropped mid-flight.
    ConnectionFailed,
    /// A per-operation timeout elapsed.
    Timeout,
    /// The peer spoke something we could not interpret.
    ProtocolError,
    /// User-initiated cancellation. Not a failure for display purposes.
    Cancelled,
    /// Internal backpressure: events were dropped. Non-fatal.
    OverflowDropped,
}

impl ErrorKind {
    /// Whether an `Error` of this kind ends the session as `Failed`.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed | Self::Timeout | Self::ProtocolError
        )
    }

    /// Short classification string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::ProtocolError => "protocol_error",
            Self::Cancelled => "cancelled",
            Self::OverflowDropped => "overflow_dropped",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DescriptorError
// ─────────────────────────────────────────────────────────────────────────────

/// Raw user input that cannot become a request descriptor.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// No URL was given.
    #[error("a URL is required")]
    MissingUrl,

    /// The URL did not parse.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The text as entered.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The URL scheme does not match the session kind.
    #[error("unsupported scheme {scheme:?} (expected {expected})")]
    UnsupportedScheme {
        /// Scheme found in the URL.
        scheme: String,
        /// Human-readable list of accepted schemes.
        expected: &'static str,
    },

    /// Unknown HTTP verb.
    #[error("unsupported HTTP method {0:?}")]
    UnsupportedMethod(String),

    /// A blank line in the middle of a header block.
    #[error("header line {line_number} is blank")]
    BlankHeaderLine {
        /// 1-based line number.
        line_number: usize,
    },

    /// A header line that is not `Key: Value`.
    #[error("header line {line_number} is malformed ({reason}): {line:?}")]
    MalformedHeader {
        /// 1-based line number.
        line_number: usize,
        /// The offending line.
        line: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Body mode was JSON but the body text is not valid JSON.
    #[error("body is not valid JSON: {0}")]
    InvalidJsonBody(String),

    /// GraphQL variables text is not valid JSON.
    #[error("variables must be valid JSON: {0}")]
    InvalidVariables(String),

    /// GraphQL variables parsed but are not a JSON object.
    #[error("variables must be a JSON object, got {0}")]
    VariablesNotObject(&'static str),

    /// GraphQL query text is empty.
    #[error("GraphQL query is required")]
    EmptyQuery,

    /// WebSocket message text is empty.
    #[error("message is empty")]
    EmptyMessage,
}
