//! Lookup orchestrator
//!
//! Drives one lookup end to end: cache check, batch fetching, incremental
//! merge, missing-identifier computation, cache write and event emission.
//! Sessions are request-scoped; duplicate requests for an identifier set that
//! is already being fetched join the running session.

use crate::db::ResultCache;
use crate::models::{
    BatchFailure, FilterSpec, LookupSession, LookupState, OrderRecord, ResultSet, SortSpec,
    StateTransition, SYSTEM_REF_ID,
};
use crate::services::batch_scheduler::{BatchScheduler, SchedulerConfig};
use crate::services::bulk_remark::{parse_bulk_remarks, BulkRemarkError};
use crate::services::export::{export_columns, write_csv, ExportError, ExportFormat};
use crate::services::normalizer::IdentifierSet;
use crate::services::query_engine::{FacetValue, QueryEngine};
use crate::services::record_transformer::RecordTransformer;
use crate::services::remote_fetcher::{BatchFetcher, FetchError, RemarkWriter};
use crate::services::summary::{summarize, LookupSummary};
use chrono::Utc;
use futures::StreamExt;
use orderwatch_common::config::LookupSettings;
use orderwatch_common::events::{EventBus, LookupEvent};
use orderwatch_common::StatusGroups;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Finished sessions retained for querying before the oldest are dropped
const MAX_RETAINED_SESSIONS: usize = 32;

/// Session shared between the orchestrator task and readers
pub type SharedSession = Arc<RwLock<LookupSession>>;

/// Lookup service errors
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Lookup session not found: {0}")]
    SessionNotFound(Uuid),

    /// Session has no result yet (still running)
    #[error("Lookup session {0} has no result yet")]
    NotReady(Uuid),

    #[error("No record with identifier {0}")]
    RecordNotFound(String),

    #[error("Remote service error: {0}")]
    Remote(#[from] FetchError),

    #[error("Invalid bulk remark input: {0}")]
    BulkRemark(#[from] BulkRemarkError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// Reply to a lookup start request
#[derive(Debug, Clone, Serialize)]
pub struct StartedLookup {
    pub session_id: Uuid,
    pub fingerprint: String,
    pub identifier_count: usize,
    pub state: LookupState,
    /// An identical lookup was already running and was joined instead
    pub deduplicated: bool,
}

/// Outcome of one bulk remark line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkRemarkStatus {
    /// Record exists; not applied (dry run)
    Matched,
    NotFound,
    Updated,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRemarkLine {
    pub line_number: usize,
    pub system_ref_id: String,
    /// Remark after canonicalization
    pub remark: String,
    pub status: BulkRemarkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-line report of a bulk remark update
#[derive(Debug, Clone, Serialize)]
pub struct BulkRemarkReport {
    pub dry_run: bool,
    /// Lines whose identifier exists in the session result
    pub matched: usize,
    pub updated: usize,
    pub failed: usize,
    pub cache_refreshed: bool,
    pub lines: Vec<BulkRemarkLine>,
}

struct SessionEntry {
    session: SharedSession,
    stop: CancellationToken,
}

/// Lookup pipeline service
pub struct LookupService {
    scheduler: BatchScheduler,
    remark_writer: Arc<dyn RemarkWriter>,
    cache: ResultCache,
    transformer: RecordTransformer,
    query_engine: QueryEngine,
    event_bus: EventBus,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl LookupService {
    pub fn new(
        fetcher: Arc<dyn BatchFetcher>,
        remark_writer: Arc<dyn RemarkWriter>,
        cache: ResultCache,
        settings: &LookupSettings,
        status_groups: Arc<StatusGroups>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            scheduler: BatchScheduler::new(fetcher, SchedulerConfig::from(settings)),
            remark_writer,
            cache,
            transformer: RecordTransformer::new(settings.transform_chunk_size),
            query_engine: QueryEngine::new(status_groups),
            event_bus,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn status_groups(&self) -> &StatusGroups {
        self.query_engine.status_groups()
    }

    /// Start a lookup in the background
    ///
    /// When a session for the same fingerprint is still running, that
    /// session is returned instead of starting a second run.
    pub async fn start(
        self: &Arc<Self>,
        identifiers: IdentifierSet,
        force_refresh: bool,
    ) -> StartedLookup {
        let mut sessions = self.sessions.write().await;

        for entry in sessions.values() {
            let existing = entry.session.read().await;
            if existing.state == LookupState::Running
                && existing.fingerprint == identifiers.fingerprint()
            {
                tracing::info!(
                    session_id = %existing.session_id,
                    fingerprint = %existing.fingerprint,
                    "Joining running lookup for identical identifier set"
                );
                return StartedLookup {
                    session_id: existing.session_id,
                    fingerprint: existing.fingerprint.clone(),
                    identifier_count: existing.identifier_count,
                    state: existing.state,
                    deduplicated: true,
                };
            }
        }

        prune_finished(&mut sessions).await;

        let session = LookupSession::new(identifiers.fingerprint().to_string(), identifiers.len());
        let session_id = session.session_id;
        let started = StartedLookup {
            session_id,
            fingerprint: session.fingerprint.clone(),
            identifier_count: session.identifier_count,
            state: session.state,
            deduplicated: false,
        };

        let shared: SharedSession = Arc::new(RwLock::new(session));
        let stop = CancellationToken::new();
        sessions.insert(
            session_id,
            SessionEntry {
                session: Arc::clone(&shared),
                stop: stop.clone(),
            },
        );
        drop(sessions);

        let service = Arc::clone(self);
        let task_session = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            service
                .execute(&task_session, &identifiers, stop, force_refresh)
                .await;
        });

        // Supervisor: a panic inside the run must still leave a terminal session
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                tracing::error!(session_id = %session_id, error = %e, "Lookup task aborted");
                service.fail_session(&shared, e.to_string()).await;
            }
        });

        started
    }

    /// Run one lookup to completion and return its result
    ///
    /// Partial batch failures still complete the session; their identifiers
    /// are reported missing and listed in the session's failure report. The
    /// cache is only written for runs with no failed batch and no stop.
    pub async fn execute(
        &self,
        session: &SharedSession,
        identifiers: &IdentifierSet,
        stop: CancellationToken,
        force_refresh: bool,
    ) -> Arc<ResultSet> {
        let session_id = session.read().await.session_id;
        let fingerprint = identifiers.fingerprint().to_string();

        tracing::info!(
            session_id = %session_id,
            fingerprint = %fingerprint,
            identifiers = identifiers.len(),
            force_refresh,
            "Starting lookup"
        );
        self.event_bus.emit_lossy(LookupEvent::LookupStarted {
            session_id,
            fingerprint: fingerprint.clone(),
            identifier_count: identifiers.len(),
            timestamp: Utc::now(),
        });

        if !force_refresh {
            if let Some(mut cached) = self.cache.get(&fingerprint).await {
                // The fingerprint ignores order; report missing in this request's order
                cached.finalize(identifiers.identifiers());
                let result = Arc::new(cached);
                self.complete_from_cache(session, Arc::clone(&result)).await;
                return result;
            }
        }

        let mut result = ResultSet::new();
        let mut failed_batches = 0usize;
        let outcomes = self.scheduler.run(identifiers.identifiers(), stop.clone());
        futures::pin_mut!(outcomes);

        while let Some(outcome) = outcomes.next().await {
            match outcome.result {
                Ok(records) => {
                    tracing::debug!(
                        session_id = %session_id,
                        batch = outcome.batch.index,
                        records = records.len(),
                        "Merging batch"
                    );
                    result = self.transformer.merge(result, records).await;
                }
                Err(e) => {
                    failed_batches += 1;
                    tracing::warn!(
                        session_id = %session_id,
                        batch = outcome.batch.index,
                        attempts = outcome.attempts,
                        error = %e,
                        "Batch failed"
                    );
                    self.event_bus.emit_lossy(LookupEvent::LookupBatchFailed {
                        session_id,
                        batch_index: outcome.batch.index,
                        identifier_count: outcome.batch.identifiers.len(),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        attempts: outcome.attempts,
                        timestamp: Utc::now(),
                    });
                    session.write().await.add_failure(BatchFailure {
                        batch_index: outcome.batch.index,
                        identifiers: outcome.batch.identifiers.clone(),
                        kind: e.kind(),
                        status: e.status(),
                        message: e.to_string(),
                        attempts: outcome.attempts,
                    });
                }
            }

            let progress = outcome.progress;
            let percent = {
                let mut s = session.write().await;
                s.update_progress(
                    progress.processed_identifiers,
                    progress.total_identifiers,
                    progress.settled_batches,
                    progress.total_batches,
                );
                s.progress.percentage.round().clamp(0.0, 100.0) as u8
            };
            self.event_bus.emit_lossy(LookupEvent::LookupProgress {
                session_id,
                processed: progress.processed_identifiers,
                total: progress.total_identifiers,
                batches_settled: progress.settled_batches,
                total_batches: progress.total_batches,
                percent,
                timestamp: Utc::now(),
            });
        }

        result.finalize(identifiers.identifiers());
        let result = Arc::new(result);
        let cancelled = stop.is_cancelled();

        // Must precede the state change: a clean COMPLETED run is already cached
        if !cancelled {
            if failed_batches == 0 {
                self.cache.put(&fingerprint, &result).await;
            } else {
                tracing::info!(
                    session_id = %session_id,
                    failed_batches,
                    "Result not cached: some batches failed"
                );
            }
        }

        let duration_ms = {
            let mut s = session.write().await;
            s.set_result(Arc::clone(&result));
            log_transition(&s.transition_to(if cancelled {
                LookupState::Cancelled
            } else {
                LookupState::Completed
            }));
            s.duration_ms()
        };

        if cancelled {
            tracing::info!(
                session_id = %session_id,
                records = result.len(),
                missing = result.missing().len(),
                "Lookup cancelled"
            );
            self.event_bus.emit_lossy(LookupEvent::LookupCancelled {
                session_id,
                record_count: result.len(),
                missing_count: result.missing().len(),
                timestamp: Utc::now(),
            });
            return result;
        }

        tracing::info!(
            session_id = %session_id,
            records = result.len(),
            missing = result.missing().len(),
            failed_batches,
            duration_ms,
            "Lookup completed"
        );
        self.event_bus.emit_lossy(LookupEvent::LookupCompleted {
            session_id,
            record_count: result.len(),
            missing_count: result.missing().len(),
            failed_batches,
            from_cache: false,
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn complete_from_cache(&self, session: &SharedSession, result: Arc<ResultSet>) {
        let (session_id, duration_ms) = {
            let mut s = session.write().await;
            let total = s.identifier_count;
            s.from_cache = true;
            s.update_progress(total, total, 0, 0);
            s.set_result(Arc::clone(&result));
            log_transition(&s.transition_to(LookupState::Completed));
            (s.session_id, s.duration_ms())
        };

        tracing::info!(
            session_id = %session_id,
            records = result.len(),
            missing = result.missing().len(),
            "Lookup served from cache"
        );
        self.event_bus.emit_lossy(LookupEvent::LookupCompleted {
            session_id,
            record_count: result.len(),
            missing_count: result.missing().len(),
            failed_batches: 0,
            from_cache: true,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    async fn fail_session(&self, session: &SharedSession, message: String) {
        let session_id = {
            let mut s = session.write().await;
            if s.is_terminal() {
                return;
            }
            s.error = Some(message.clone());
            log_transition(&s.transition_to(LookupState::Failed));
            s.session_id
        };
        self.event_bus.emit_lossy(LookupEvent::LookupFailed {
            session_id,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Session by id
    pub async fn session(&self, session_id: Uuid) -> Result<SharedSession, LookupError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or(LookupError::SessionNotFound(session_id))
    }

    /// Snapshot of a session's state
    pub async fn snapshot(&self, session_id: Uuid) -> Result<LookupSession, LookupError> {
        let session = self.session(session_id).await?;
        let snapshot = session.read().await.clone();
        Ok(snapshot)
    }

    /// Latest result of a finished session
    pub async fn result(&self, session_id: Uuid) -> Result<Arc<ResultSet>, LookupError> {
        let session = self.session(session_id).await?;
        let result = session.read().await.result.clone();
        result.ok_or(LookupError::NotReady(session_id))
    }

    /// Request a stop; returns `false` when the session had already finished
    pub async fn cancel(&self, session_id: Uuid) -> Result<bool, LookupError> {
        let (session, stop) = {
            let sessions = self.sessions.read().await;
            let entry = sessions
                .get(&session_id)
                .ok_or(LookupError::SessionNotFound(session_id))?;
            (Arc::clone(&entry.session), entry.stop.clone())
        };

        if session.read().await.is_terminal() {
            return Ok(false);
        }

        tracing::info!(session_id = %session_id, "Stop requested");
        stop.cancel();
        Ok(true)
    }

    /// Filtered and sorted view of a session's result
    pub async fn query(
        &self,
        session_id: Uuid,
        filters: &FilterSpec,
        sort: &SortSpec,
    ) -> Result<Arc<Vec<OrderRecord>>, LookupError> {
        let result = self.result(session_id).await?;
        Ok(self.query_engine.apply(&result, filters, sort))
    }

    pub async fn facets(
        &self,
        session_id: Uuid,
        column: &str,
    ) -> Result<Vec<FacetValue>, LookupError> {
        let result = self.result(session_id).await?;
        Ok(self.query_engine.facets(&result, column))
    }

    pub async fn summary(&self, session_id: Uuid) -> Result<LookupSummary, LookupError> {
        let result = self.result(session_id).await?;
        Ok(summarize(&result, self.status_groups()))
    }

    /// Change a record's remark on the remote service, then locally
    ///
    /// The session's result is replaced by a copy carrying the new remark so
    /// memoized views recompute. The cache entry is left untouched; call
    /// [`LookupService::refresh_cache`] to persist the edit.
    pub async fn update_remark(
        &self,
        session_id: Uuid,
        system_ref_id: &str,
        remark: Option<String>,
    ) -> Result<OrderRecord, LookupError> {
        let session = self.session(session_id).await?;
        let remark = remark.filter(|r| !r.is_empty());

        let identifier = {
            let s = session.read().await;
            let result = s.result.as_ref().ok_or(LookupError::NotReady(session_id))?;
            find_identifier(result, system_ref_id)
                .ok_or_else(|| LookupError::RecordNotFound(system_ref_id.to_string()))?
        };

        self.remark_writer
            .update_remark(system_ref_id, remark.as_deref())
            .await?;

        let updated = {
            let mut s = session.write().await;
            let result = s.result.as_ref().ok_or(LookupError::NotReady(session_id))?;
            let next = result
                .with_remark(&identifier, remark.clone())
                .ok_or_else(|| LookupError::RecordNotFound(system_ref_id.to_string()))?;
            let record = next
                .get(&identifier)
                .cloned()
                .ok_or_else(|| LookupError::RecordNotFound(system_ref_id.to_string()))?;
            s.set_result(Arc::new(next));
            record
        };

        self.event_bus.emit_lossy(LookupEvent::RemarkUpdated {
            session_id,
            system_ref_id: system_ref_id.to_string(),
            remark,
            timestamp: Utc::now(),
        });

        Ok(updated)
    }

    /// Write a finished session's current result to the cache
    ///
    /// Returns whether an entry was written. Running sessions, cancelled
    /// sessions and sessions with failed batches are never cached.
    pub async fn refresh_cache(&self, session_id: Uuid) -> Result<bool, LookupError> {
        let session = self.session(session_id).await?;
        let (fingerprint, result) = {
            let s = session.read().await;
            if s.state != LookupState::Completed || !s.failures.is_empty() {
                return Ok(false);
            }
            let result = s.result.clone().ok_or(LookupError::NotReady(session_id))?;
            (s.fingerprint.clone(), result)
        };
        Ok(self.cache.put(&fingerprint, &result).await)
    }

    /// Apply pasted `identifier<TAB>remark` lines to a finished session
    ///
    /// Lines are matched against the current result by record identifier or
    /// `SystemRefId`; unmatched lines are reported and skipped. Each match is
    /// written through [`LookupService::update_remark`] and a failed write
    /// does not stop the rest. With `dry_run` nothing is written. The cache
    /// is refreshed once when at least one remark changed.
    pub async fn bulk_update_remarks(
        &self,
        session_id: Uuid,
        text: &str,
        dry_run: bool,
    ) -> Result<BulkRemarkReport, LookupError> {
        let edits = parse_bulk_remarks(text)?;
        let result = self.result(session_id).await?;

        let mut report = BulkRemarkReport {
            dry_run,
            matched: 0,
            updated: 0,
            failed: 0,
            cache_refreshed: false,
            lines: Vec::with_capacity(edits.len()),
        };

        for edit in edits {
            // Remote edits are keyed by SystemRefId even when the paste used the order number
            let remote_id = find_identifier(&result, &edit.system_ref_id).and_then(|identifier| {
                result
                    .get(&identifier)
                    .and_then(|r| r.column_value(SYSTEM_REF_ID))
                    .map(|v| v.into_owned())
            });

            let (status, message) = match remote_id {
                None => (BulkRemarkStatus::NotFound, None),
                Some(_) if dry_run => {
                    report.matched += 1;
                    (BulkRemarkStatus::Matched, None)
                }
                Some(remote_id) => {
                    report.matched += 1;
                    match self
                        .update_remark(session_id, &remote_id, Some(edit.remark.clone()))
                        .await
                    {
                        Ok(_) => {
                            report.updated += 1;
                            (BulkRemarkStatus::Updated, None)
                        }
                        Err(e) => {
                            tracing::warn!(
                                session_id = %session_id,
                                line = edit.line_number,
                                system_ref_id = %remote_id,
                                error = %e,
                                "Bulk remark line failed"
                            );
                            report.failed += 1;
                            (BulkRemarkStatus::Failed, Some(e.to_string()))
                        }
                    }
                }
            };

            report.lines.push(BulkRemarkLine {
                line_number: edit.line_number,
                system_ref_id: edit.system_ref_id,
                remark: edit.remark,
                status,
                message,
            });
        }

        if report.updated > 0 {
            report.cache_refreshed = self.refresh_cache(session_id).await?;
        }

        tracing::info!(
            session_id = %session_id,
            lines = report.lines.len(),
            matched = report.matched,
            updated = report.updated,
            failed = report.failed,
            dry_run,
            "Bulk remark update processed"
        );

        Ok(report)
    }

    /// CSV of a session's filtered and sorted view
    ///
    /// Columns are the filter's visible columns, or every column when unset.
    pub async fn export(
        &self,
        session_id: Uuid,
        filters: &FilterSpec,
        sort: &SortSpec,
        format: ExportFormat,
    ) -> Result<Vec<u8>, LookupError> {
        let rows = self.query(session_id, filters, sort).await?;
        let columns = export_columns(&rows, filters.visible_columns.as_deref());
        Ok(write_csv(&rows, &columns, format)?)
    }
}

fn log_transition(transition: &StateTransition) {
    tracing::debug!(
        session_id = %transition.session_id,
        from = ?transition.old_state,
        to = ?transition.new_state,
        at = %transition.transitioned_at,
        "Session state changed"
    );
}

/// Identifier of the record matching `system_ref_id`
///
/// Matches the record identifier first, then the `SystemRefId` column of
/// records identified by their order number.
fn find_identifier(result: &ResultSet, system_ref_id: &str) -> Option<String> {
    if result.contains(system_ref_id) {
        return Some(system_ref_id.to_string());
    }
    result
        .records()
        .iter()
        .find(|r| r.column_value(SYSTEM_REF_ID).as_deref() == Some(system_ref_id))
        .map(|r| r.identifier.clone())
}

/// Drop the oldest finished sessions beyond the retention limit
async fn prune_finished(sessions: &mut HashMap<Uuid, SessionEntry>) {
    if sessions.len() < MAX_RETAINED_SESSIONS {
        return;
    }

    let mut finished = Vec::new();
    for (id, entry) in sessions.iter() {
        let s = entry.session.read().await;
        if s.is_terminal() {
            finished.push((s.ended_at, *id));
        }
    }
    finished.sort();

    let excess = sessions.len() + 1 - MAX_RETAINED_SESSIONS;
    for (_, id) in finished.into_iter().take(excess) {
        sessions.remove(&id);
        tracing::debug!(session_id = %id, "Dropped finished session");
    }
}
