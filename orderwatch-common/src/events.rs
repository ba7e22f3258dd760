//! Lookup event types and the broadcast EventBus
//!
//! Events are emitted by the lookup orchestrator and forwarded to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events describing the lifecycle of lookup sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LookupEvent {
    /// A lookup session started (cache check pending)
    LookupStarted {
        session_id: Uuid,
        fingerprint: String,
        identifier_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch settled (success or failure)
    LookupProgress {
        session_id: Uuid,
        /// Identifiers covered by settled batches
        processed: usize,
        total: usize,
        batches_settled: usize,
        total_batches: usize,
        /// 0-100
        percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// A batch exhausted its attempts or hit a non-retryable error
    LookupBatchFailed {
        session_id: Uuid,
        batch_index: usize,
        identifier_count: usize,
        /// Failure classification (transport, timeout, client, server, decode)
        kind: String,
        message: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Session finished; partial batch failures still count as completed
    LookupCompleted {
        session_id: Uuid,
        record_count: usize,
        missing_count: usize,
        failed_batches: usize,
        from_cache: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Session stopped on request before every batch was dispatched
    LookupCancelled {
        session_id: Uuid,
        record_count: usize,
        missing_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session aborted by an internal error
    LookupFailed {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A record's remark was changed through the remote service
    RemarkUpdated {
        session_id: Uuid,
        system_ref_id: String,
        remark: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl LookupEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            LookupEvent::LookupStarted { .. } => "LookupStarted",
            LookupEvent::LookupProgress { .. } => "LookupProgress",
            LookupEvent::LookupBatchFailed { .. } => "LookupBatchFailed",
            LookupEvent::LookupCompleted { .. } => "LookupCompleted",
            LookupEvent::LookupCancelled { .. } => "LookupCancelled",
            LookupEvent::LookupFailed { .. } => "LookupFailed",
            LookupEvent::RemarkUpdated { .. } => "RemarkUpdated",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            LookupEvent::LookupStarted { session_id, .. }
            | LookupEvent::LookupProgress { session_id, .. }
            | LookupEvent::LookupBatchFailed { session_id, .. }
            | LookupEvent::LookupCompleted { session_id, .. }
            | LookupEvent::LookupCancelled { session_id, .. }
            | LookupEvent::LookupFailed { session_id, .. }
            | LookupEvent::RemarkUpdated { session_id, .. } => *session_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// observe `Lagged` instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LookupEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LookupEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: LookupEvent,
    ) -> Result<usize, broadcast::error::SendError<LookupEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LookupEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
