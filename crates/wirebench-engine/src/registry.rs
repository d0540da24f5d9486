//! Session registry.
//!
//! Owns every session's record: kind, lifecycle state, descriptor,
//! cancellation token and adapter handle. Records live in a `DashMap`, so
//! sessions never contend on a global lock. State is applied on the
//! producer side through [`SessionObserver`] as events leave each adapter.
//!
//! WebSocket sessions share one connection slot: a second WebSocket cannot
//! be created while another is non-terminal. HTTP and GraphQL sessions are
//! unslotted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use wirebench_core::{
    CloseReason, ErrorKind, EventPayload, RequestDescriptor, SessionEvent, SessionId, SessionKind,
    SessionState,
};
use wirebench_transport::{SendError, TransportHandle, TransportRequest, Transports};

use crate::errors::{EngineError, Result};
use crate::multiplexer::{Multiplexer, SessionObserver};

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    /// Identity.
    pub id: SessionId,
    /// Transport kind.
    pub kind: SessionKind,
    /// Lifecycle state.
    pub state: SessionState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// What the session does.
    pub descriptor: Arc<RequestDescriptor>,
    /// Whether the adapter task is still attached.
    pub attached: bool,
    /// Highest sequence number applied.
    pub last_seq: u64,
    /// Most recent response status code.
    pub last_status: Option<u16>,
    /// Most recent failure, if any.
    pub last_error: Option<(ErrorKind, String)>,
    /// Why the session closed, once closed.
    pub close_reason: Option<CloseReason>,
}

/// What a cancel or close request did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    /// Cancellation was requested; the session is now `Cancelling`.
    Cancelling,
    /// A graceful WebSocket close was requested.
    Closing,
    /// No-op: cancellation was already requested.
    AlreadyCancelling,
    /// No-op: a graceful close was already requested.
    AlreadyClosing,
    /// No-op: the session already finished.
    AlreadyFinished(SessionState),
}

impl ControlOutcome {
    /// Whether the call changed nothing.
    pub fn is_noop(self) -> bool {
        matches!(
            self,
            Self::AlreadyCancelling | Self::AlreadyClosing | Self::AlreadyFinished(_)
        )
    }
}

#[derive(Debug)]
struct SessionRecord {
    id: SessionId,
    kind: SessionKind,
    state: SessionState,
    created_at: DateTime<Utc>,
    descriptor: Arc<RequestDescriptor>,
    cancel: CancellationToken,
    handle: Option<TransportHandle>,
    attached: bool,
    closing: bool,
    last_seq: u64,
    last_status: Option<u16>,
    last_error: Option<(ErrorKind, String)>,
    close_reason: Option<CloseReason>,
}

impl SessionRecord {
    fn snapshot(&self) -> Session {
        Session {
            id: self.id.clone(),
            kind: self.kind,
            state: self.state,
            created_at: self.created_at,
            descriptor: Arc::clone(&self.descriptor),
            attached: self.attached,
            last_seq: self.last_seq,
            last_status: self.last_status,
            last_error: self.last_error.clone(),
            close_reason: self.close_reason.clone(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!(session_id = %self.id, from = %self.state, to = %next, "state transition");
            self.state = next;
        } else if self.state == SessionState::Cancelling && next == SessionState::Open {
            debug!(session_id = %self.id, "started after cancel request");
        } else if self.state != next {
            warn!(session_id = %self.id, from = %self.state, to = %next, "illegal transition ignored");
        }
    }

    fn invalid(&self, reason: &'static str) -> EngineError {
        EngineError::InvalidState {
            session_id: self.id.clone(),
            state: self.state,
            reason,
        }
    }
}

/// Session records, shared with the multiplexer's pumps.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, SessionRecord>,
}

impl SessionObserver for SessionTable {
    fn on_event(&self, event: &SessionEvent) -> bool {
        let Some(mut record) = self.sessions.get_mut(&event.session_id) else {
            return false;
        };
        record.last_seq = event.seq;
        match &event.payload {
            EventPayload::Started => record.transition(SessionState::Open),
            EventPayload::StatusChanged(status) => record.last_status = Some(status.code),
            EventPayload::Error { kind, detail } if kind.is_failure() => {
                record.last_error = Some((*kind, detail.clone()));
                if record.state == SessionState::Cancelling {
                    record.transition(SessionState::Closed);
                } else {
                    record.transition(SessionState::Failed);
                }
            }
            EventPayload::Closed(reason) => {
                record.close_reason = Some(reason.clone());
                record.transition(SessionState::Closed);
            }
            _ => {}
        }
        true
    }

    fn state_of(&self, session_id: &SessionId) -> Option<SessionState> {
        self.sessions.get(session_id).map(|r| r.state)
    }

    fn on_detach(&self, session_id: &SessionId) {
        if let Some(mut record) = self.sessions.get_mut(session_id) {
            record.attached = false;
            record.handle = None;
            debug!(session_id = %session_id, state = %record.state, "adapter detached");
        }
    }
}

/// Creates, controls and tracks sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    table: Arc<SessionTable>,
    multiplexer: Arc<Multiplexer>,
    transports: Transports,
    ws_slot: Mutex<Option<SessionId>>,
}

impl SessionRegistry {
    /// Empty registry feeding `multiplexer`.
    pub fn new(multiplexer: Arc<Multiplexer>, transports: Transports) -> Self {
        Self {
            table: Arc::new(SessionTable::default()),
            multiplexer,
            transports,
            ws_slot: Mutex::new(None),
        }
    }

    /// Validate, register and start a session. Never blocks on I/O.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(kind = %descriptor.kind()))]
    pub fn create(&self, descriptor: RequestDescriptor) -> Result<SessionId> {
        descriptor.validate()?;
        let kind = descriptor.kind();
        let id = SessionId::new();

        let mut slot = (kind == SessionKind::WebSocketConnection).then(|| self.ws_slot.lock());
        if let Some(slot) = slot.as_deref_mut() {
            if let Some(active) = slot.as_ref() {
                if self.table.state_of(active).is_some_and(|s| !s.is_terminal()) {
                    return Err(EngineError::SlotOccupied {
                        active: active.clone(),
                    });
                }
            }
            *slot = Some(id.clone());
        }

        let descriptor = Arc::new(descriptor);
        let cancel = CancellationToken::new();
        let _ = self.table.sessions.insert(
            id.clone(),
            SessionRecord {
                id: id.clone(),
                kind,
                state: SessionState::Pending,
                created_at: Utc::now(),
                descriptor: Arc::clone(&descriptor),
                cancel: cancel.clone(),
                handle: None,
                attached: true,
                closing: false,
                last_seq: 0,
                last_status: None,
                last_error: None,
                close_reason: None,
            },
        );
        drop(slot);

        let observer: Arc<dyn SessionObserver> = self.table.clone();
        let emitter = self.multiplexer.attach(id.clone(), observer);
        let handle = self.transports.for_kind(kind).start(TransportRequest {
            session_id: id.clone(),
            descriptor: Arc::clone(&descriptor),
            emitter,
            cancel,
        });

        if let Some(mut record) = self.table.sessions.get_mut(&id) {
            if record.attached {
                record.handle = Some(handle);
            }
        }
        debug!(session_id = %id, summary = %descriptor.summary(), "session created");
        Ok(id)
    }

    /// Request cancellation. Idempotent: repeat calls report a no-op.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn cancel(&self, id: &SessionId) -> Result<ControlOutcome> {
        let mut record = self
            .table
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        match record.state {
            state if state.is_terminal() => Ok(ControlOutcome::AlreadyFinished(state)),
            SessionState::Cancelling => Ok(ControlOutcome::AlreadyCancelling),
            _ => {
                record.transition(SessionState::Cancelling);
                record.cancel.cancel();
                Ok(ControlOutcome::Cancelling)
            }
        }
    }

    /// Close a session. An open WebSocket gets a graceful close handshake;
    /// everything else is cancelled.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn close(&self, id: &SessionId) -> Result<ControlOutcome> {
        {
            let mut record = self
                .table
                .sessions
                .get_mut(id)
                .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
            if record.kind == SessionKind::WebSocketConnection && record.state == SessionState::Open {
                if record.closing {
                    return Ok(ControlOutcome::AlreadyClosing);
                }
                if let Some(handle) = &record.handle {
                    handle.close();
                    record.closing = true;
                    return Ok(ControlOutcome::Closing);
                }
            }
        }
        self.cancel(id)
    }

    /// Queue a text frame on an open WebSocket session.
    #[instrument(skip(self, text), fields(session_id = %id, len = text.len()))]
    pub fn send_text(&self, id: &SessionId, text: String) -> Result<()> {
        let record = self
            .table
            .sessions
            .get(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        if record.kind != SessionKind::WebSocketConnection {
            return Err(record.invalid("not a WebSocket session"));
        }
        if record.state != SessionState::Open || record.closing {
            return Err(record.invalid("socket is not open"));
        }
        let handle = record.handle.as_ref().ok_or_else(|| record.invalid("socket is not open"))?;
        handle.send_text(text).map_err(|e| match e {
            SendError::QueueFull => EngineError::SendQueueFull(id.clone()),
            SendError::NotConnected => record.invalid("socket is not open"),
        })
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.table.sessions.get(id).map(|r| r.snapshot())
    }

    /// Current state of one session.
    pub fn state_of(&self, id: &SessionId) -> Option<SessionState> {
        self.table.state_of(id)
    }

    /// Non-terminal sessions, oldest first.
    pub fn list_active(&self) -> Vec<Session> {
        self.collect(|r| !r.state.is_terminal())
    }

    /// Every retained session, oldest first.
    pub fn list_all(&self) -> Vec<Session> {
        self.collect(|_| true)
    }

    fn collect(&self, keep: impl Fn(&SessionRecord) -> bool) -> Vec<Session> {
        let mut out: Vec<Session> = self
            .table
            .sessions
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| r.snapshot())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// The WebSocket session currently holding the slot, if non-terminal.
    pub fn active_websocket(&self) -> Option<SessionId> {
        let slot = self.ws_slot.lock();
        slot.as_ref()
            .filter(|id| self.table.state_of(id).is_some_and(|s| !s.is_terminal()))
            .cloned()
    }

    /// Remove a finished session whose adapter has detached.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn evict(&self, id: &SessionId) -> Result<Session> {
        let removed = self
            .table
            .sessions
            .remove_if(id, |_, r| r.state.is_terminal() && !r.attached);
        match removed {
            Some((_, record)) => Ok(record.snapshot()),
            None => match self.table.sessions.get(id) {
                Some(record) => Err(record.invalid("session is still running")),
                None => Err(EngineError::SessionNotFound(id.clone())),
            },
        }
    }

    /// Evict every finished, detached session. Returns how many went.
    pub fn clear_history(&self) -> usize {
        let before = self.table.sessions.len();
        self.table
            .sessions
            .retain(|_, r| !(r.state.is_terminal() && !r.attached));
        before.saturating_sub(self.table.sessions.len())
    }

    /// Cancel every non-terminal session. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<SessionId> = self.list_active().into_iter().map(|s| s.id).collect();
        ids.iter()
            .filter(|id| matches!(self.cancel(id), Ok(ControlOutcome::Cancelling)))
            .count()
    }

    /// Take every adapter handle still held, for shutdown.
    pub fn take_handles(&self) -> Vec<TransportHandle> {
        self.table
            .sessions
            .iter_mut()
            .filter_map(|mut r| r.handle.take())
            .collect()
    }

    /// Sessions retained.
    pub fn len(&self) -> usize {
        self.table.sessions.len()
    }

    /// Whether no sessions are retained.
    pub fn is_empty(&self) -> bool {
        self.table.sessions.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Script, ScriptedTransport, http_descriptor, ws_descriptor};
    use assert_matches::assert_matches;
    use std::time::Duration;
    use wirebench_core::{DescriptorError, GraphQlDescriptor, HeaderList};

    fn registry(script: Script) -> (SessionRegistry, Arc<Multiplexer>) {
        let mux = Arc::new(Multiplexer::new(256, 16, Duration::from_millis(20)));
        let transports = ScriptedTransport::set(script);
        (SessionRegistry::new(Arc::clone(&mux), transports), mux)
    }

    async fn wait_for(registry: &SessionRegistry, id: &SessionId, pred: impl Fn(&Session) -> bool) -> Session {
        for _ in 0..500 {
            if let Some(s) = registry.get(id) {
                if pred(&s) {
                    return s;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached for {id}: {:?}", registry.get(id));
    }

    #[tokio::test]
    async fn completed_session_reaches_closed() {
        let (registry, _mux) = registry(Script::Complete);
        let id = registry.create(http_descriptor()).unwrap();
        let s = wait_for(&registry, &id, |s| !s.attached).await;
        assert_eq!(s.state, SessionState::Closed);
        assert_eq!(s.last_status, Some(200));
        assert_eq!(s.close_reason, Some(CloseReason::Completed));
        assert!(registry.list_active().is_empty());
    }

    #[tokio::test]
    async fn failed_session_records_error() {
        let (registry, _mux) = registry(Script::Fail(ErrorKind::Timeout));
        let id = registry.create(http_descriptor()).unwrap();
        let s = wait_for(&registry, &id, |s| !s.attached).await;
        assert_eq!(s.state, SessionState::Failed);
        assert_matches!(s.last_error, Some((ErrorKind::Timeout, _)));
    }

    #[tokio::test]
    async fn invalid_descriptor_creates_nothing() {
        let (registry, _mux) = registry(Script::Complete);
        let desc = RequestDescriptor::GraphQl(GraphQlDescriptor {
            url: "http://localhost/graphql".parse().unwrap(),
            headers: HeaderList::new(),
            query: String::new(),
            operation_name: None,
            variables: None,
        });
        assert_eq!(
            registry.create(desc),
            Err(EngineError::InvalidDescriptor(DescriptorError::EmptyQuery))
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn cancel_twice_is_reported_noop() {
        let (registry, _mux) = registry(Script::Hang);
        let id = registry.create(http_descriptor()).unwrap();
        let _ = wait_for(&registry, &id, |s| s.state == SessionState::Open).await;

        assert_eq!(registry.cancel(&id).unwrap(), ControlOutcome::Cancelling);
        let second = registry.cancel(&id).unwrap();
        assert!(second.is_noop());
        assert!(matches!(
            second,
            ControlOutcome::AlreadyCancelling | ControlOutcome::AlreadyFinished(SessionState::Closed)
        ));

        let s = wait_for(&registry, &id, |s| !s.attached).await;
        assert_eq!(s.state, SessionState::Closed);
        assert_eq!(s.close_reason, Some(CloseReason::Cancelled));
        assert_eq!(
            registry.cancel(&id).unwrap(),
            ControlOutcome::AlreadyFinished(SessionState::Closed)
        );
    }

    #[tokio::test]
    async fn cancel_unknown_session_is_not_found() {
        let (registry, _mux) = registry(Script::Complete);
        let ghost = SessionId::new();
        assert_eq!(registry.cancel(&ghost), Err(EngineError::SessionNotFound(ghost)));
    }

    #[tokio::test]
    async fn websocket_slot_is_exclusive_until_terminal() {
        let (registry, _mux) = registry(Script::Hang);
        let first = registry.create(ws_descriptor()).unwrap();
        assert_eq!(registry.active_websocket(), Some(first.clone()));
        assert_eq!(
            registry.create(ws_descriptor()),
            Err(EngineError::SlotOccupied { active: first.clone() })
        );
        // HTTP sessions are unslotted.
        assert!(registry.create(http_descriptor()).is_ok());

        let _ = registry.cancel(&first).unwrap();
        let _ = wait_for(&registry, &first, |s| s.state.is_terminal()).await;
        assert!(registry.create(ws_descriptor()).is_ok());
    }

    #[tokio::test]
    async fn send_text_requires_open_websocket() {
        let (registry, _mux) = registry(Script::Hang);
        let http = registry.create(http_descriptor()).unwrap();
        assert_matches!(
            registry.send_text(&http, "hi".into()),
            Err(EngineError::InvalidState { reason: "not a WebSocket session", .. })
        );

        let ws = registry.create(ws_descriptor()).unwrap();
        let _ = wait_for(&registry, &ws, |s| s.state == SessionState::Open).await;
        registry.send_text(&ws, "hi".into()).unwrap();

        assert_eq!(registry.close(&ws).unwrap(), ControlOutcome::Closing);
        assert_eq!(registry.close(&ws).unwrap(), ControlOutcome::AlreadyClosing);
        assert_matches!(
            registry.send_text(&ws, "late".into()),
            Err(EngineError::InvalidState { .. })
        );
        let s = wait_for(&registry, &ws, |s| !s.attached).await;
        assert_eq!(s.close_reason, Some(CloseReason::LocalClose));
        assert_matches!(
            registry.send_text(&ws, "after".into()),
            Err(EngineError::InvalidState { state: SessionState::Closed, .. })
        );
    }

    #[tokio::test]
    async fn close_on_http_cancels() {
        let (registry, _mux) = registry(Script::Hang);
        let id = registry.create(http_descriptor()).unwrap();
        assert_eq!(registry.close(&id).unwrap(), ControlOutcome::Cancelling);
    }

    #[tokio::test]
    async fn evict_only_finished_detached_sessions() {
        let (registry, _mux) = registry(Script::Hang);
        let running = registry.create(http_descriptor()).unwrap();
        assert_matches!(registry.evict(&running), Err(EngineError::InvalidState { .. }));

        let _ = registry.cancel(&running).unwrap();
        let _ = wait_for(&registry, &running, |s| !s.attached).await;
        let evicted = registry.evict(&running).unwrap();
        assert_eq!(evicted.state, SessionState::Closed);
        assert_eq!(
            registry.evict(&running),
            Err(EngineError::SessionNotFound(running))
        );
    }

    #[tokio::test]
    async fn cancel_all_and_clear_history() {
        let (registry, _mux) = registry(Script::Hang);
        let ids: Vec<SessionId> = (0..3).map(|_| registry.create(http_descriptor()).unwrap()).collect();
        assert_eq!(registry.list_all().len(), 3);
        assert_eq!(registry.list_all()[0].id, ids[0]);

        assert_eq!(registry.cancel_all(), 3);
        for id in &ids {
            let _ = wait_for(&registry, id, |s| !s.attached).await;
        }
        assert_eq!(registry.cancel_all(), 0);
        assert_eq!(registry.clear_history(), 3);
        assert!(registry.is_empty());
    }
}
