//! # wirebench-engine
//!
//! The session engine: validates form input, runs sessions on the
//! transport adapters and merges their events into one activity log.
//!
//! - [`dispatcher`]: raw form text to [`RequestDescriptor`](wirebench_core::RequestDescriptor)
//! - [`registry`]: session records, state machine and WebSocket slot
//! - [`multiplexer`]: per-session pumps feeding a bounded consumer queue
//! - [`log`]: bounded activity log
//! - [`engine`]: the [`Engine`] facade tying them together

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod log;
pub mod multiplexer;
pub mod registry;

#[cfg(test)]
mod testing;

pub use dispatcher::{GraphQlForm, HttpForm, WebSocketForm};
pub use engine::Engine;
pub use errors::{EngineError, ErrorClass, Result};
pub use log::{ActivityLog, ActivityLogEntry};
pub use multiplexer::{Multiplexer, SessionObserver};
pub use registry::{ControlOutcome, Session, SessionRegistry};
