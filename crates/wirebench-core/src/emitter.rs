//! Per-adapter event channel.
//!
//! Every transport adapter owns one [`EventEmitter`], the sending half of a
//! bounded `mpsc` channel. The engine's multiplexer holds the matching
//! [`EventReceiver`].
//!
//! Non-terminal events wait at most `max_block` for channel capacity and
//! are dropped (and counted) past that. Terminal events always wait, so a
//! session can never lose its final `Closed` or failure `Error`. The next
//! event that gets through carries the count of drops before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::warn;

use crate::events::EventPayload;
use crate::ids::SessionId;

/// A payload plus the instant the adapter produced it.
#[derive(Clone, Debug)]
pub struct EmittedEvent {
    /// What happened.
    pub payload: EventPayload,
    /// Adapter-side timestamp.
    pub timestamp: DateTime<Utc>,
    /// Events dropped between the previous delivered event and this one.
    pub dropped_before: u64,
}

/// Sending half handed to an adapter.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    session_id: SessionId,
    tx: mpsc::Sender<EmittedEvent>,
    dropped: Arc<AtomicU64>,
    max_block: Duration,
}

/// Receiving half held by the multiplexer.
#[derive(Debug)]
pub struct EventReceiver {
    session_id: SessionId,
    rx: mpsc::Receiver<EmittedEvent>,
    dropped: Arc<AtomicU64>,
}

/// Create a bounded emitter/receiver pair for one session.
pub fn channel(
    session_id: SessionId,
    capacity: usize,
    max_block: Duration,
) -> (EventEmitter, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventEmitter {
            session_id: session_id.clone(),
            tx,
            dropped: Arc::clone(&dropped),
            max_block,
        },
        EventReceiver {
            session_id,
            rx,
            dropped,
        },
    )
}

impl EventEmitter {
    /// Session this emitter belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Emit a payload.
    ///
    /// Returns `false` when the event was not delivered, either because it
    /// was dropped under backpressure or because the receiver is gone.
    pub async fn emit(&self, payload: EventPayload) -> bool {
        let event = EmittedEvent {
            payload,
            timestamp: Utc::now(),
            dropped_before: self.dropped.swap(0, Ordering::Relaxed),
        };

        if event.payload.is_terminal() {
            return self.tx.send(event).await.is_ok();
        }

        match self.tx.send_timeout(event, self.max_block).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(event)) => {
                let lost = event.dropped_before + 1;
                let total = self.dropped.fetch_add(lost, Ordering::Relaxed) + lost;
                warn!(
                    session_id = %self.session_id,
                    event_type = event.payload.event_type(),
                    total_dropped = total,
                    "adapter channel full, dropping event"
                );
                false
            }
            Err(SendTimeoutError::Closed(_)) => false,
        }
    }
}

impl EventReceiver {
    /// Session this receiver belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Next event, or `None` once every emitter is dropped and the channel
    /// is drained.
    pub async fn recv(&mut self) -> Option<EmittedEvent> {
        self.rx.recv().await
    }

    /// Drops not yet carried by a delivered event, resetting the counter.
    /// Only meaningful once the channel has ended.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
