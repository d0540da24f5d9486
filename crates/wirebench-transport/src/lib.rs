//! # wirebench-transport
//!
//! Transport adapters. Each executor implements [`Transport`]: `start`
//! spawns one tokio task that performs the network work and reports
//! everything it observes as events through the session's
//! [`EventEmitter`]. Failures never surface as `Result`s; they become a
//! single terminal `Error` event.
//!
//! - [`HttpTransport`]: one-shot HTTP request via `reqwest`
//! - [`GraphQlTransport`]: GraphQL query posted over HTTP
//! - [`WebSocketTransport`]: long-lived socket via `tokio-tungstenite`

#![deny(unsafe_code)]

pub mod error;
pub mod graphql;
pub mod handle;
pub mod http;
pub mod websocket;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wirebench_core::{
    CloseReason, ErrorKind, EventEmitter, EventPayload, RequestDescriptor, SessionId, SessionKind,
};
use wirebench_settings::WorkbenchSettings;

pub use graphql::GraphQlTransport;
pub use handle::{SendError, SocketCommand, TransportHandle};
pub use http::HttpTransport;
pub use websocket::WebSocketTransport;

/// Everything an adapter needs to run one session.
#[derive(Debug)]
pub struct TransportRequest {
    /// Session being served.
    pub session_id: SessionId,
    /// Immutable description of the work.
    pub descriptor: Arc<RequestDescriptor>,
    /// Where to report events.
    pub emitter: EventEmitter,
    /// Cooperative cancellation signal.
    pub cancel: CancellationToken,
}

/// A protocol executor.
pub trait Transport: Send + Sync {
    /// Session kind this executor serves.
    fn kind(&self) -> SessionKind;

    /// Spawn the adapter task and return immediately.
    fn start(&self, request: TransportRequest) -> TransportHandle;
}

/// One executor per session kind.
#[derive(Clone)]
pub struct Transports {
    http: Arc<dyn Transport>,
    graphql: Arc<dyn Transport>,
    websocket: Arc<dyn Transport>,
}

impl Transports {
    /// Assemble from explicit executors.
    pub fn new(
        http: Arc<dyn Transport>,
        graphql: Arc<dyn Transport>,
        websocket: Arc<dyn Transport>,
    ) -> Self {
        Self {
            http,
            graphql,
            websocket,
        }
    }

    /// Network executors configured from settings. HTTP and GraphQL share
    /// one connection pool.
    pub fn from_settings(settings: &WorkbenchSettings) -> Self {
        let http = HttpTransport::new(&settings.http);
        let graphql = GraphQlTransport::with_client(http.client().clone());
        Self::new(
            Arc::new(http),
            Arc::new(graphql),
            Arc::new(WebSocketTransport::new(settings.websocket.clone())),
        )
    }

    /// Executor for `kind`.
    pub fn for_kind(&self, kind: SessionKind) -> &Arc<dyn Transport> {
        match kind {
            SessionKind::HttpRequest => &self.http,
            SessionKind::GraphQlQuery => &self.graphql,
            SessionKind::WebSocketConnection => &self.websocket,
        }
    }
}

impl std::fmt::Debug for Transports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transports").finish_non_exhaustive()
    }
}

/// Report a user cancellation: `Error(Cancelled)` then `Closed(Cancelled)`.
pub(crate) async fn emit_cancelled(emitter: &EventEmitter) {
    let _ = emitter
        .emit(EventPayload::error(ErrorKind::Cancelled, "cancelled by user"))
        .await;
    let _ = emitter.emit(EventPayload::Closed(CloseReason::Cancelled)).await;
}

/// Report a descriptor routed to the wrong executor.
pub(crate) async fn emit_kind_mismatch(emitter: &EventEmitter, expected: SessionKind) {
    let _ = emitter
        .emit(EventPayload::error(
            ErrorKind::ProtocolError,
            format!("descriptor is not a {expected} request"),
        ))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executors_route_by_kind() {
        let transports = Transports::from_settings(&WorkbenchSettings::default());
        for kind in [
            SessionKind::HttpRequest,
            SessionKind::GraphQlQuery,
            SessionKind::WebSocketConnection,
        ] {
            assert_eq!(transports.for_kind(kind).kind(), kind);
        }
    }
}
