//! # wirebench-core
//!
//! Shared vocabulary for the wirebench session engine:
//!
//! - **Ids**: [`SessionId`], a branded time-ordered identifier
//! - **Sessions**: [`SessionKind`] and the [`SessionState`] lifecycle
//! - **Descriptors**: the immutable [`RequestDescriptor`] a session executes
//! - **Parsing**: strict conversion of raw user text into descriptor parts
//! - **Events**: [`SessionEvent`] and its [`EventPayload`] variants
//! - **Emitter**: the bounded per-adapter event channel
//! - **Errors**: [`ErrorKind`] failure classes and [`DescriptorError`]

#![deny(unsafe_code)]

pub mod descriptor;
pub mod emitter;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod parse;
pub mod session;

pub use descriptor::{
    Body, GraphQlDescriptor, Header, HeaderList, HttpDescriptor, Method, RequestDescriptor,
    WebSocketDescriptor,
};
pub use emitter::{EmittedEvent, EventEmitter, EventReceiver};
pub use errors::{DescriptorError, ErrorKind};
pub use events::{CloseReason, EventPayload, GraphQlEnvelope, Progress, SessionEvent, StatusInfo};
pub use ids::SessionId;
pub use parse::BodyMode;
pub use session::{SessionKind, SessionState};
