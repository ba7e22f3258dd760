//! Lookup session state machine
//!
//! A session is created per lookup request and progresses
//! RUNNING → COMPLETED | CANCELLED | FAILED.

use super::result_set::ResultSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Lookup session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LookupState {
    /// Cache check or batch fetching in progress
    Running,
    /// Every dispatched batch settled (some may have failed)
    Completed,
    /// Stopped on request; undispatched identifiers are missing
    Cancelled,
    /// Aborted by an internal error
    Failed,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: LookupState,
    pub new_state: LookupState,
    pub transitioned_at: DateTime<Utc>,
}

/// Classification of a failed batch fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Transport,
    Timeout,
    Client,
    Server,
    Decode,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::Client => "client",
            FailureKind::Server => "server",
            FailureKind::Decode => "decode",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// One entry of a session's failure report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub identifiers: Vec<String>,
    pub kind: FailureKind,
    /// HTTP status for client/server failures
    pub status: Option<u16>,
    pub message: String,
    pub attempts: u32,
}

/// Progress tracking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupProgress {
    /// Identifiers covered by settled batches
    pub processed: usize,
    pub total: usize,
    pub batches_settled: usize,
    pub total_batches: usize,
    /// 0.0 - 100.0
    pub percentage: f64,
}

/// Lookup session (in-memory state)
#[derive(Debug, Clone, Serialize)]
pub struct LookupSession {
    pub session_id: Uuid,
    /// Fingerprint of the requested identifier set
    pub fingerprint: String,
    pub identifier_count: usize,
    pub state: LookupState,
    pub progress: LookupProgress,
    pub failures: Vec<BatchFailure>,
    /// Result was served from the persistent cache
    pub from_cache: bool,
    pub record_count: usize,
    pub missing_count: usize,
    /// Internal error that moved the session to FAILED
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Latest result; replaced (never mutated) on every change
    #[serde(skip)]
    pub result: Option<Arc<ResultSet>>,
}

impl LookupSession {
    pub fn new(fingerprint: String, identifier_count: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            fingerprint,
            identifier_count,
            state: LookupState::Running,
            progress: LookupProgress {
                total: identifier_count,
                ..Default::default()
            },
            failures: Vec::new(),
            from_cache: false,
            record_count: 0,
            missing_count: 0,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            result: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: LookupState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Update progress after a batch settles
    pub fn update_progress(
        &mut self,
        processed: usize,
        total: usize,
        batches_settled: usize,
        total_batches: usize,
    ) {
        self.progress = LookupProgress {
            processed,
            total,
            batches_settled,
            total_batches,
            percentage: if total > 0 {
                (processed as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        };
    }

    /// Replace the session's result and refresh derived counts
    pub fn set_result(&mut self, result: Arc<ResultSet>) {
        self.record_count = result.len();
        self.missing_count = result.missing().len();
        self.result = Some(result);
    }

    pub fn add_failure(&mut self, failure: BatchFailure) {
        self.failures.push(failure);
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            LookupState::Completed | LookupState::Cancelled | LookupState::Failed
        )
    }

    /// Elapsed wall time, up to `ended_at` for finished sessions
    pub fn duration_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_running() {
        let session = LookupSession::new("abc".to_string(), 10);
        assert_eq!(session.state, LookupState::Running);
        assert_eq!(session.progress.total, 10);
        assert!(!session.is_terminal());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut session = LookupSession::new("abc".to_string(), 10);
        let transition = session.transition_to(LookupState::Cancelled);

        assert_eq!(transition.old_state, LookupState::Running);
        assert_eq!(transition.new_state, LookupState::Cancelled);
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_progress_percentage() {
        let mut session = LookupSession::new("abc".to_string(), 5000);
        session.update_progress(2000, 5000, 1, 3);
        assert!((session.progress.percentage - 40.0).abs() < f64::EPSILON);

        session.update_progress(0, 0, 0, 0);
        assert_eq!(session.progress.percentage, 0.0);
    }

    #[test]
    fn test_state_serializes_uppercase() {
        let json = serde_json::to_value(LookupState::Completed).unwrap();
        assert_eq!(json, "COMPLETED");
        let json = serde_json::to_value(FailureKind::Server).unwrap();
        assert_eq!(json, "server");
    }
}
