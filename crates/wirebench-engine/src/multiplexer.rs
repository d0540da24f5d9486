//! Event stream multiplexer.
//!
//! Merges every adapter's bounded channel into one bounded consumer queue.
//!
//! ```text
//!  adapter ─emit─► [mpsc, cap A] ─► pump ─┐
//!  adapter ─emit─► [mpsc, cap A] ─► pump ─┼─► [shared queue, cap Q] ─► consumer
//!  adapter ─emit─► [mpsc, cap A] ─► pump ─┘
//! ```
//!
//! Each session gets a pump task that stamps per-session sequence numbers,
//! hands the event to the [`SessionObserver`] (the registry applies state
//! here, so state never depends on queue retention) and pushes it into the
//! shared queue.
//!
//! Loss is always visible:
//! - adapter-side drops (producer blocked past `max_emit_block`) become an
//!   `Error(OverflowDropped)` just before the next event that got through,
//!   unless the session has already ended;
//! - shared-queue overflow evicts the oldest event and the consumer receives
//!   one `Error(OverflowDropped)` marker per affected session before the rest
//!   of the queue.
//!
//! Per-session order is preserved; cross-session order is arrival order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};
use wirebench_core::emitter::{self, EventEmitter, EventReceiver};
use wirebench_core::{CloseReason, ErrorKind, EventPayload, SessionEvent, SessionId, SessionState};

/// Sees every event before it is queued.
pub trait SessionObserver: Send + Sync {
    /// Apply `event`. Returns `false` if the session is unknown.
    fn on_event(&self, event: &SessionEvent) -> bool;

    /// Current state of a session, if known.
    fn state_of(&self, session_id: &SessionId) -> Option<SessionState>;

    /// The session's adapter channel has closed; no more events will come.
    fn on_detach(&self, session_id: &SessionId);
}

/// Events evicted from the shared queue for one session, not yet reported.
#[derive(Debug)]
struct PendingDrop {
    session_id: SessionId,
    count: u64,
    first_seq: u64,
    last_seq: u64,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<SessionEvent>,
    drops: Vec<PendingDrop>,
}

#[derive(Debug)]
struct Shared {
    queue: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    evicted_total: AtomicU64,
}

impl Shared {
    fn push(&self, event: SessionEvent) {
        {
            let mut state = self.queue.lock();
            if state.events.len() >= self.capacity {
                if let Some(evicted) = state.events.pop_front() {
                    record_drop(&mut state.drops, &evicted);
                    let _ = self.evicted_total.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        session_id = %evicted.session_id,
                        seq = evicted.seq,
                        "event queue full, evicted oldest event"
                    );
                }
            }
            state.events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<SessionEvent> {
        let mut state = self.queue.lock();
        if !state.drops.is_empty() {
            return Some(overflow_marker(state.drops.remove(0)));
        }
        state.events.pop_front()
    }
}

fn record_drop(drops: &mut Vec<PendingDrop>, evicted: &SessionEvent) {
    if let Some(existing) = drops.iter_mut().find(|d| d.session_id == evicted.session_id) {
        existing.count += 1;
        existing.last_seq = evicted.seq;
    } else {
        drops.push(PendingDrop {
            session_id: evicted.session_id.clone(),
            count: 1,
            first_seq: evicted.seq,
            last_seq: evicted.seq,
            at: evicted.timestamp,
        });
    }
}

fn overflow_marker(drop: PendingDrop) -> SessionEvent {
    let detail = if drop.first_seq == drop.last_seq {
        format!("1 event dropped (seq {})", drop.first_seq)
    } else {
        format!(
            "{} events dropped (seq {}..={})",
            drop.count, drop.first_seq, drop.last_seq
        )
    };
    SessionEvent {
        session_id: drop.session_id,
        seq: drop.last_seq,
        timestamp: drop.at,
        payload: EventPayload::error(ErrorKind::OverflowDropped, detail),
    }
}

/// Fan-in of per-session adapter channels into one consumer queue.
#[derive(Debug)]
pub struct Multiplexer {
    shared: Arc<Shared>,
    adapter_capacity: usize,
    max_block: Duration,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl Multiplexer {
    /// Multiplexer with a shared queue of `queue_capacity` events and
    /// per-adapter channels of `adapter_capacity`.
    pub fn new(queue_capacity: usize, adapter_capacity: usize, max_block: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                capacity: queue_capacity.max(1),
                evicted_total: AtomicU64::new(0),
            }),
            adapter_capacity,
            max_block,
            pumps: Mutex::new(Vec::new()),
        }
    }

    /// Open a channel for `session_id` and spawn its pump.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, session_id: SessionId, observer: Arc<dyn SessionObserver>) -> EventEmitter {
        let (tx, rx) = emitter::channel(session_id.clone(), self.adapter_capacity, self.max_block);
        let span = info_span!("pump", session_id = %session_id);
        let task = tokio::spawn(pump(Arc::clone(&self.shared), observer, rx).instrument(span));

        let mut pumps = self.pumps.lock();
        pumps.retain(|p| !p.is_finished());
        pumps.push(task);
        tx
    }

    /// Pop the next event without waiting.
    pub fn try_recv(&self) -> Option<SessionEvent> {
        self.shared.pop()
    }

    /// Pop the next event, waiting up to `timeout`.
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.shared.pop() {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, self.shared.notify.notified())
                .await
                .is_err()
            {
                return self.shared.pop();
            }
        }
    }

    /// Pop up to `max` events without waiting.
    pub fn drain(&self, max: usize) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.shared.pop() {
                Some(event) => out.push(event),
                None => break,
            }
        }
        out
    }

    /// Events currently queued, excluding pending overflow markers.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().events.len()
    }

    /// Whether nothing is waiting for the consumer.
    pub fn is_empty(&self) -> bool {
        let state = self.shared.queue.lock();
        state.events.is_empty() && state.drops.is_empty()
    }

    /// Events evicted from the shared queue since creation.
    pub fn evicted_total(&self) -> u64 {
        self.shared.evicted_total.load(Ordering::Relaxed)
    }

    /// Wait for every pump to finish, at most `limit`. Returns whether all did.
    pub async fn join_pumps(&self, limit: Duration) -> bool {
        let pumps: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pumps.lock());
        let all = futures::future::join_all(pumps);
        tokio::time::timeout(limit, all).await.is_ok()
    }
}

/// Per-session forwarding loop.
async fn pump(shared: Arc<Shared>, observer: Arc<dyn SessionObserver>, mut rx: EventReceiver) {
    let session_id = rx.session_id().clone();
    let mut seq = 0_u64;
    let mut terminated = false;

    let mut deliver = |payload: EventPayload, timestamp: DateTime<Utc>| {
        seq += 1;
        let event = SessionEvent {
            session_id: session_id.clone(),
            seq,
            timestamp,
            payload,
        };
        if observer.on_event(&event) {
            shared.push(event);
        } else {
            error!(
                session_id = %event.session_id,
                seq = event.seq,
                event_type = event.payload.event_type(),
                "event for unknown session, discarding"
            );
        }
    };

    while let Some(emitted) = rx.recv().await {
        if terminated {
            warn!(
                session_id = %session_id,
                event_type = emitted.payload.event_type(),
                "event after terminal event, discarding"
            );
            continue;
        }
        if emitted.dropped_before > 0 {
            deliver(adapter_drop_marker(emitted.dropped_before), emitted.timestamp);
        }
        terminated = emitted.payload.is_terminal();
        deliver(emitted.payload, emitted.timestamp);
    }

    if !terminated {
        let dropped = rx.take_dropped();
        if dropped > 0 {
            deliver(adapter_drop_marker(dropped), Utc::now());
        }
        match observer.state_of(&session_id) {
            Some(SessionState::Cancelling) => {
                debug!(session_id = %session_id, "adapter ended while cancelling");
                deliver(EventPayload::Closed(CloseReason::Cancelled), Utc::now());
            }
            Some(state) if !state.is_terminal() => {
                warn!(session_id = %session_id, %state, "adapter ended without a terminal event");
                deliver(
                    EventPayload::error(
                        ErrorKind::ProtocolError,
                        "adapter ended without a terminal event",
                    ),
                    Utc::now(),
                );
            }
            _ => {}
        }
    }

    observer.on_detach(&session_id);
}

fn adapter_drop_marker(dropped: u64) -> EventPayload {
    EventPayload::error(
        ErrorKind::OverflowDropped,
        format!("{dropped} events dropped by adapter backpressure"),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
