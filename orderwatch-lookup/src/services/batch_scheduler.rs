//! Batch scheduler
//!
//! Partitions an identifier set into fixed-size batches and fetches them with
//! bounded concurrency. Dispatch is greedy: whenever a batch settles the next
//! unstarted one is spawned, so slow batches never hold up the rest.
//!
//! A failed batch never cancels the others. Each batch runs as its own tokio
//! task; the consumer of the outcome stream can merge at its own pace while
//! the network keeps working. Dropping the stream aborts in-flight batches.

use crate::models::RawRecord;
use crate::services::remote_fetcher::{BatchFetcher, FetchError};
use crate::utils::{retry_with_backoff, RetryPolicy};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use orderwatch_common::config::LookupSettings;
use std::future::Future;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// A contiguous slice of the identifier set, fetched in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based position in dispatch order
    pub index: usize,
    pub identifiers: Vec<String>,
}

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl SchedulerConfig {
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        (&LookupSettings::default()).into()
    }
}

impl From<&LookupSettings> for SchedulerConfig {
    fn from(settings: &LookupSettings) -> Self {
        SchedulerConfig::new(settings.batch_size, settings.concurrency)
            .with_retry(settings.retry.into())
    }
}

/// Running totals reported with every settled batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Identifiers covered by settled batches
    pub processed_identifiers: usize,
    pub total_identifiers: usize,
    pub settled_batches: usize,
    pub total_batches: usize,
}

/// Result of one batch after all its attempts
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch: Arc<Batch>,
    pub result: Result<Vec<RawRecord>, FetchError>,
    pub attempts: u32,
    pub progress: BatchProgress,
}

/// Split identifiers into `ceil(len / batch_size)` contiguous batches
pub fn partition(identifiers: &[String], batch_size: usize) -> Vec<Batch> {
    identifiers
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            identifiers: chunk.to_vec(),
        })
        .collect()
}

/// Dispatches batches to a [`BatchFetcher`]
pub struct BatchScheduler {
    fetcher: Arc<dyn BatchFetcher>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(fetcher: Arc<dyn BatchFetcher>, config: SchedulerConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Fetch every batch of `identifiers`, yielding outcomes as they settle
    ///
    /// `stop` is checked before each dispatch: after it is cancelled no new
    /// batch starts, in-flight batches finish (without further retries) and
    /// the stream ends once they have settled.
    pub fn run(
        &self,
        identifiers: &[String],
        stop: CancellationToken,
    ) -> impl Stream<Item = BatchOutcome> + Send + 'static {
        let batches = partition(identifiers, self.config.batch_size);
        let total_identifiers = identifiers.len();
        let total_batches = batches.len();
        let concurrency = self.config.concurrency.max(1);
        let retry = self.config.retry;
        let fetcher = Arc::clone(&self.fetcher);

        tracing::info!(
            total_identifiers,
            total_batches,
            batch_size = self.config.batch_size,
            concurrency,
            "Dispatching batches"
        );

        async_stream::stream! {
            let mut pending = batches.into_iter();
            let mut in_flight = FuturesUnordered::new();
            let mut processed_identifiers = 0usize;
            let mut settled_batches = 0usize;

            // Seed initial tasks
            for _ in 0..concurrency {
                if stop.is_cancelled() {
                    break;
                }
                match pending.next() {
                    Some(batch) => in_flight.push(spawn_batch(
                        Arc::new(batch),
                        Arc::clone(&fetcher),
                        retry,
                        stop.clone(),
                    )),
                    None => break,
                }
            }

            while let Some((batch, result, attempts)) = in_flight.next().await {
                processed_identifiers += batch.identifiers.len();
                settled_batches += 1;

                // Refill the freed slot before handing the outcome over
                if !stop.is_cancelled() {
                    if let Some(next) = pending.next() {
                        in_flight.push(spawn_batch(
                            Arc::new(next),
                            Arc::clone(&fetcher),
                            retry,
                            stop.clone(),
                        ));
                    }
                }

                yield BatchOutcome {
                    batch,
                    result,
                    attempts,
                    progress: BatchProgress {
                        processed_identifiers,
                        total_identifiers,
                        settled_batches,
                        total_batches,
                    },
                };
            }

            let undispatched = pending.count();
            if undispatched > 0 {
                tracing::info!(undispatched, "Stop requested, remaining batches not dispatched");
            }
        }
    }
}

/// Aborts the wrapped task when dropped before it finished
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn one batch (with retries) as a tokio task
///
/// The task is tied to the returned future: dropping the future aborts it.
fn spawn_batch(
    batch: Arc<Batch>,
    fetcher: Arc<dyn BatchFetcher>,
    retry: RetryPolicy,
    stop: CancellationToken,
) -> impl Future<Output = (Arc<Batch>, Result<Vec<RawRecord>, FetchError>, u32)> {
    let task_batch = Arc::clone(&batch);
    let handle = tokio::spawn(async move {
        let operation_name = format!("fetch batch {}", task_batch.index);
        retry_with_backoff(
            &operation_name,
            &retry,
            &stop,
            FetchError::is_retryable,
            || fetcher.fetch(&task_batch),
        )
        .await
    });
    let guard = AbortOnDrop(handle.abort_handle());

    async move {
        let _guard = guard;
        match handle.await {
            Ok((result, attempts)) => {
                tracing::debug!(
                    batch = batch.index,
                    attempts,
                    ok = result.is_ok(),
                    "Batch settled"
                );
                (batch, result, attempts)
            }
            Err(e) => {
                tracing::error!(batch = batch.index, error = %e, "Batch task aborted");
                (batch, Err(FetchError::Internal(e.to_string())), 1)
            }
        }
    }
}
