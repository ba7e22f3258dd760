//! Test Helper Utilities
//!
//! Shared mocks and builders for orderwatch-lookup integration tests

pub mod mock_remote;

use async_trait::async_trait;
use orderwatch_common::config::{LookupSettings, RetrySettings};
use orderwatch_common::events::EventBus;
use orderwatch_common::StatusGroups;
use orderwatch_lookup::db::{init_database_pool, ResultCache};
use orderwatch_lookup::models::RawRecord;
use orderwatch_lookup::services::{Batch, BatchFetcher, FetchError, LookupService, RemarkWriter};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Identifiers with this prefix are unknown to the mock remote
pub const UNKNOWN_PREFIX: &str = "UNKNOWN";

/// `n` identifiers `SO-00000`, `SO-00001`, ...
pub fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SO-{:05}", i)).collect()
}

/// Row the mock remote returns for `id`
pub fn remote_row(id: &str) -> RawRecord {
    let value = json!({
        "SystemRefId": id,
        "Order Number": format!("ON-{}", id),
        "Status_Interfaced": "Yes",
        "Channel": "Shopee",
        "Remark": null,
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// In-process fetcher recording concurrency and failing chosen batches
pub struct MockFetcher {
    pub delay: Duration,
    /// Batch indices that always fail with a 503
    pub failing_batches: HashSet<usize>,
    /// Batch indices that fail once with a 502, then succeed
    pub flaky_batches: HashSet<usize>,
    /// Batch indices that fail with a 400
    pub rejected_batches: HashSet<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    completed: AtomicUsize,
    flaked: Mutex<HashSet<usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(20),
            failing_batches: HashSet::new(),
            flaky_batches: HashSet::new(),
            rejected_batches: HashSet::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            flaked: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, batch_index: usize) -> Self {
        self.failing_batches.insert(batch_index);
        self
    }

    pub fn flaky(mut self, batch_index: usize) -> Self {
        self.flaky_batches.insert(batch_index);
        self
    }

    pub fn rejecting(mut self, batch_index: usize) -> Self {
        self.rejected_batches.insert(batch_index);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that got past the simulated network delay
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchFetcher for MockFetcher {
    async fn fetch(&self, batch: &Batch) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.failing_batches.contains(&batch.index) {
            return Err(FetchError::Server {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        if self.rejected_batches.contains(&batch.index) {
            return Err(FetchError::Client {
                status: 400,
                message: "Invalid ids".to_string(),
            });
        }
        if self.flaky_batches.contains(&batch.index)
            && self.flaked.lock().unwrap().insert(batch.index)
        {
            return Err(FetchError::Server {
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }

        Ok(batch
            .identifiers
            .iter()
            .filter(|id| !id.starts_with(UNKNOWN_PREFIX))
            .map(|id| remote_row(id))
            .collect())
    }
}

/// Remark writer recording every call
#[derive(Default)]
pub struct MockRemarkWriter {
    pub calls: Mutex<Vec<(String, Option<String>)>>,
    pub fail: bool,
}

impl MockRemarkWriter {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl RemarkWriter for MockRemarkWriter {
    async fn update_remark(
        &self,
        system_ref_id: &str,
        remark: Option<&str>,
    ) -> Result<(), FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_ref_id.to_string(), remark.map(str::to_string)));
        if self.fail {
            return Err(FetchError::Server {
                status: 500,
                message: "remark store down".to_string(),
            });
        }
        Ok(())
    }
}

/// Lookup settings with small batches and fast retries
pub fn test_settings(batch_size: usize, concurrency: usize) -> LookupSettings {
    LookupSettings {
        batch_size,
        concurrency,
        transform_chunk_size: 100,
        retry: RetrySettings {
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
        },
        ..LookupSettings::default()
    }
}

/// Cache backed by a fresh database file in a temp dir
///
/// The TempDir must be kept alive for the duration of the test.
pub async fn create_test_cache() -> (TempDir, ResultCache) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database_pool(&temp_dir.path().join("orderwatch.db"))
        .await
        .expect("Failed to create test database");
    (temp_dir, ResultCache::new(pool, Duration::from_secs(1800)))
}

/// Everything a service test needs to inspect
pub struct TestService {
    pub service: Arc<LookupService>,
    pub fetcher: Arc<MockFetcher>,
    pub remark_writer: Arc<MockRemarkWriter>,
    pub _temp_dir: Option<TempDir>,
}

/// Service over mocks with a real on-disk cache
pub async fn create_test_service(
    fetcher: MockFetcher,
    remark_writer: MockRemarkWriter,
    settings: LookupSettings,
) -> TestService {
    let (temp_dir, cache) = create_test_cache().await;
    build(fetcher, remark_writer, settings, cache, Some(temp_dir))
}

/// Service over mocks with caching disabled
pub fn create_uncached_service(fetcher: MockFetcher, settings: LookupSettings) -> TestService {
    build(
        fetcher,
        MockRemarkWriter::default(),
        settings,
        ResultCache::disabled(),
        None,
    )
}

fn build(
    fetcher: MockFetcher,
    remark_writer: MockRemarkWriter,
    settings: LookupSettings,
    cache: ResultCache,
    temp_dir: Option<TempDir>,
) -> TestService {
    let fetcher = Arc::new(fetcher);
    let remark_writer = Arc::new(remark_writer);
    let service = Arc::new(LookupService::new(
        fetcher.clone(),
        remark_writer.clone(),
        cache,
        &settings,
        Arc::new(StatusGroups::default()),
        EventBus::new(1000),
    ));
    TestService {
        service,
        fetcher,
        remark_writer,
        _temp_dir: temp_dir,
    }
}

/// Poll a session until it leaves RUNNING
pub async fn wait_for_terminal(
    service: &LookupService,
    session_id: uuid::Uuid,
) -> orderwatch_lookup::models::LookupSession {
    for _ in 0..500 {
        let snapshot = service.snapshot(session_id).await.unwrap();
        if snapshot.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Session {} did not finish", session_id);
}
