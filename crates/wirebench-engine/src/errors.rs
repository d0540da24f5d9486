//! Engine error types.

use thiserror::Error;
use wirebench_core::{DescriptorError, SessionId, SessionState};

/// Errors returned synchronously by engine operations.
///
/// Transport failures are never reported here; they arrive as `Error`
/// events on the session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The user's input could not become a request descriptor.
    #[error("invalid request: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    /// The operation does not apply to the session in its current state.
    #[error("session {session_id} is {state}: {reason}")]
    InvalidState {
        /// Target session.
        session_id: SessionId,
        /// State at the time of the call.
        state: SessionState,
        /// What was wrong.
        reason: &'static str,
    },

    /// Another WebSocket session holds the connection slot.
    #[error("already connected ({active}); disconnect first")]
    SlotOccupied {
        /// Session holding the slot.
        active: SessionId,
    },

    /// No session with that id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The socket's outbound queue is full.
    #[error("send queue full for session {0}")]
    SendQueueFull(SessionId),
}

/// Coarse error classes for the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad input; nothing was created.
    InvalidDescriptor,
    /// The session exists but cannot do that now.
    InvalidState,
    /// Unknown session.
    NotFound,
}

impl EngineError {
    /// Classify for display.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidDescriptor(_) => ErrorClass::InvalidDescriptor,
            Self::InvalidState { .. } | Self::SlotOccupied { .. } | Self::SendQueueFull(_) => {
                ErrorClass::InvalidState
            }
            Self::SessionNotFound(_) => ErrorClass::NotFound,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
