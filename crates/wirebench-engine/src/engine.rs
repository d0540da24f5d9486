//! The engine facade.
//!
//! [`Engine`] owns the registry, the multiplexer and the activity log. A
//! presentation layer submits forms, controls sessions, and calls
//! [`Engine::poll`] to move events from the multiplexer into the log, which
//! it then renders with [`Engine::since`] or [`Engine::tail`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use wirebench_core::SessionId;
use wirebench_settings::WorkbenchSettings;
use wirebench_transport::Transports;

use crate::dispatcher::{GraphQlForm, HttpForm, WebSocketForm, validate_message};
use crate::errors::Result;
use crate::log::{ActivityLog, ActivityLogEntry};
use crate::multiplexer::Multiplexer;
use crate::registry::{ControlOutcome, Session, SessionRegistry};

/// Most events moved into the log per [`Engine::poll`] call.
const POLL_BATCH: usize = 256;

/// Request/response workbench engine.
#[derive(Debug)]
pub struct Engine {
    settings: WorkbenchSettings,
    registry: SessionRegistry,
    multiplexer: Arc<Multiplexer>,
    log: ActivityLog,
}

impl Engine {
    /// Engine with network transports configured from `settings`.
    pub fn new(settings: WorkbenchSettings) -> Self {
        let transports = Transports::from_settings(&settings);
        Self::with_transports(settings, transports)
    }

    /// Engine with explicit transports.
    pub fn with_transports(settings: WorkbenchSettings, transports: Transports) -> Self {
        let engine = &settings.engine;
        let multiplexer = Arc::new(Multiplexer::new(
            engine.event_queue_capacity,
            engine.adapter_queue_capacity,
            engine.max_emit_block(),
        ));
        let log = ActivityLog::new(engine.log_capacity);
        let registry = SessionRegistry::new(Arc::clone(&multiplexer), transports);
        debug!(
            queue = engine.event_queue_capacity,
            log = engine.log_capacity,
            "engine ready"
        );
        Self {
            settings,
            registry,
            multiplexer,
            log,
        }
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &WorkbenchSettings {
        &self.settings
    }

    /// The session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The activity log.
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    // ── submission ──────────────────────────────────────────────────

    /// Validate and start an HTTP request.
    pub fn submit_http_request(&self, form: HttpForm) -> Result<SessionId> {
        self.registry.create(form.into_descriptor()?)
    }

    /// Validate and start a GraphQL query.
    pub fn submit_graphql_query(&self, form: GraphQlForm) -> Result<SessionId> {
        self.registry.create(form.into_descriptor()?)
    }

    /// Validate and open a WebSocket.
    pub fn open_websocket(&self, form: WebSocketForm) -> Result<SessionId> {
        self.registry.create(form.into_descriptor()?)
    }

    /// Queue a text frame on an open WebSocket.
    pub fn send_websocket_message(&self, id: &SessionId, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        validate_message(&text)?;
        self.registry.send_text(id, text)
    }

    // ── control ─────────────────────────────────────────────────────

    /// Cancel a session.
    pub fn cancel_session(&self, id: &SessionId) -> Result<ControlOutcome> {
        self.registry.cancel(id)
    }

    /// Close a session: graceful for an open WebSocket, cancel otherwise.
    pub fn close_session(&self, id: &SessionId) -> Result<ControlOutcome> {
        self.registry.close(id)
    }

    // ── reading ─────────────────────────────────────────────────────

    /// Wait up to `timeout` for events and append them to the log.
    /// Returns how many were appended.
    pub async fn poll(&self, timeout: Duration) -> usize {
        let Some(first) = self.multiplexer.recv_timeout(timeout).await else {
            return 0;
        };
        let _ = self.log.append(first);
        1 + self.flush(POLL_BATCH - 1)
    }

    /// Append whatever is queued right now, up to `max` events.
    fn flush(&self, max: usize) -> usize {
        let events = self.multiplexer.drain(max);
        let count = events.len();
        for event in events {
            let _ = self.log.append(event);
        }
        count
    }

    /// Latest `n` log entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Arc<ActivityLogEntry>> {
        self.log.tail(n)
    }

    /// Log entries newer than `log_seq`.
    pub fn since(&self, log_seq: u64) -> Vec<Arc<ActivityLogEntry>> {
        self.log.since(log_seq)
    }

    /// Every retained session, oldest first.
    pub fn statuses(&self) -> Vec<Session> {
        self.registry.list_all()
    }

    /// One session.
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.registry.get(id)
    }

    /// Clear the activity log and evict finished sessions. Returns how many
    /// sessions were evicted.
    pub fn clear_history(&self) -> usize {
        self.log.clear();
        self.registry.clear_history()
    }

    // ── teardown ────────────────────────────────────────────────────

    /// Cancel everything, wait for adapters within the shutdown grace,
    /// abort stragglers and move the remaining events into the log.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let grace = self.settings.engine.shutdown_grace();
        let cancelled = self.registry.cancel_all();
        let handles = self.registry.take_handles();
        info!(cancelled, adapters = handles.len(), "shutting down");

        let deadline = tokio::time::Instant::now() + grace;
        while handles.iter().any(|h| !h.is_finished()) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stragglers: Vec<_> = handles.iter().filter(|h| !h.is_finished()).collect();
        if !stragglers.is_empty() {
            warn!(count = stragglers.len(), grace_ms = grace.as_millis(), "aborting adapters");
            for handle in stragglers {
                handle.abort();
            }
        }

        if !self.multiplexer.join_pumps(grace).await {
            warn!("event pumps still running after shutdown grace");
        }
        let mut moved = 0;
        loop {
            let n = self.flush(POLL_BATCH);
            moved += n;
            if n == 0 {
                break;
            }
        }
        debug!(moved, "drained remaining events");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Script, ScriptedTransport};
    use crate::errors::EngineError;
    use assert_matches::assert_matches;
    use wirebench_core::{CloseReason, DescriptorError, EventPayload, SessionState};

    fn engine(script: Script) -> Engine {
        Engine::with_transports(WorkbenchSettings::default(), ScriptedTransport::set(script))
    }

    async fn poll_until(engine: &Engine, id: &SessionId, state: SessionState) {
        for _ in 0..200 {
            let _ = engine.poll(Duration::from_millis(10)).await;
            if engine.session(id).is_some_and(|s| s.state == state && !s.attached) {
                let _ = engine.poll(Duration::from_millis(10)).await;
                return;
            }
        }
        panic!("{id} never reached {state}");
    }

    fn http_form() -> HttpForm {
        HttpForm {
            url: "http://localhost/health".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submitted_request_lands_in_log() {
        let engine = engine(Script::Complete);
        let id = engine.submit_http_request(http_form()).unwrap();
        poll_until(&engine, &id, SessionState::Closed).await;

        let types: Vec<&str> = engine
            .tail(10)
            .iter()
            .map(|e| e.event.payload.event_type())
            .collect();
        assert_eq!(types, ["started", "status_changed", "closed"]);
        assert_eq!(engine.statuses().len(), 1);
    }

    #[tokio::test]
    async fn invalid_variables_create_no_session() {
        let engine = engine(Script::Complete);
        let result = engine.submit_graphql_query(GraphQlForm {
            url: "http://localhost/graphql".into(),
            query: "{ me { id } }".into(),
            variables: "not json".into(),
            ..Default::default()
        });
        assert_matches!(
            result,
            Err(EngineError::InvalidDescriptor(DescriptorError::InvalidVariables(_)))
        );
        assert!(engine.statuses().is_empty());
        assert_eq!(engine.poll(Duration::from_millis(20)).await, 0);
    }

    #[tokio::test]
    async fn empty_message_rejected_before_session_lookup() {
        let engine = engine(Script::Hang);
        let ghost = SessionId::new();
        assert_eq!(
            engine.send_websocket_message(&ghost, ""),
            Err(EngineError::InvalidDescriptor(DescriptorError::EmptyMessage))
        );
        assert_eq!(
            engine.send_websocket_message(&ghost, "hi"),
            Err(EngineError::SessionNotFound(ghost))
        );
    }

    #[tokio::test]
    async fn since_supports_incremental_redraw() {
        let engine = engine(Script::Complete);
        let first = engine.submit_http_request(http_form()).unwrap();
        poll_until(&engine, &first, SessionState::Closed).await;
        let mark = engine.log().last_seq();

        let second = engine.submit_http_request(http_form()).unwrap();
        poll_until(&engine, &second, SessionState::Closed).await;
        let newer = engine.since(mark);
        assert_eq!(newer.len(), 3);
        assert!(newer.iter().all(|e| e.event.session_id == second));
    }

    #[tokio::test]
    async fn clear_history_empties_log_and_finished_sessions() {
        let engine = engine(Script::Complete);
        let id = engine.submit_http_request(http_form()).unwrap();
        poll_until(&engine, &id, SessionState::Closed).await;
        assert_eq!(engine.clear_history(), 1);
        assert!(engine.tail(10).is_empty());
        assert!(engine.session(&id).is_none());
    }

    #[tokio::test]
    async fn shutdown_cancels_and_drains() {
        let engine = engine(Script::Hang);
        let http = engine.submit_http_request(http_form()).unwrap();
        let ws = engine
            .open_websocket(WebSocketForm {
                url: "ws://localhost/socket".into(),
                headers: String::new(),
            })
            .unwrap();

        engine.shutdown().await;

        for id in [&http, &ws] {
            let session = engine.session(id).unwrap();
            assert_eq!(session.state, SessionState::Closed);
            assert_eq!(session.close_reason, Some(CloseReason::Cancelled));
            let last = engine.log().for_session(id, 1);
            assert_eq!(last[0].event.payload, EventPayload::Closed(CloseReason::Cancelled));
        }
        assert!(engine.registry().list_active().is_empty());
    }
}
