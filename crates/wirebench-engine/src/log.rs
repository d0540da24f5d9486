//! Append-only activity log.
//!
//! A bounded circular buffer of [`ActivityLogEntry`]s. Entries are never
//! mutated after insertion; the oldest are evicted past capacity. Log
//! sequence numbers keep increasing across [`ActivityLog::clear`] so a
//! renderer can redraw incrementally with [`ActivityLog::since`].

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use wirebench_core::{SessionEvent, SessionId};

/// Default maximum entries retained.
pub const DEFAULT_LOG_CAPACITY: usize = 5000;

/// One log line.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    /// Global log sequence number, starting at 1.
    pub log_seq: u64,
    /// When the entry was appended.
    pub recorded_at: DateTime<Utc>,
    /// The event.
    pub event: SessionEvent,
}

#[derive(Debug)]
struct LogInner {
    entries: VecDeque<Arc<ActivityLogEntry>>,
    next_seq: u64,
}

/// Bounded, thread-safe activity log.
#[derive(Debug)]
pub struct ActivityLog {
    inner: Mutex<LogInner>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    /// Log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 1,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Maximum entries retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event and return its log sequence number.
    pub fn append(&self, event: SessionEvent) -> u64 {
        let mut inner = self.inner.lock();
        let log_seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(Arc::new(ActivityLogEntry {
            log_seq,
            recorded_at: Utc::now(),
            event,
        }));
        if inner.entries.len() > self.capacity {
            let _ = inner.entries.pop_front();
        }
        log_seq
    }

    /// The latest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Arc<ActivityLogEntry>> {
        let inner = self.inner.lock();
        let skip = inner.entries.len().saturating_sub(n);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    /// Entries with a log sequence number greater than `log_seq`.
    pub fn since(&self, log_seq: u64) -> Vec<Arc<ActivityLogEntry>> {
        let inner = self.inner.lock();
        let start = inner.entries.partition_point(|e| e.log_seq <= log_seq);
        inner.entries.iter().skip(start).cloned().collect()
    }

    /// The latest `limit` entries for one session, oldest first.
    pub fn for_session(&self, session_id: &SessionId, limit: usize) -> Vec<Arc<ActivityLogEntry>> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .entries
            .iter()
            .rev()
            .filter(|e| &e.event.session_id == session_id)
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    /// Drop every entry. Sequence numbering continues.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Sequence number of the newest entry ever appended (0 if none).
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().next_seq - 1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
