//! Batch scheduler integration tests

mod helpers;

use futures::StreamExt;
use helpers::{ids, MockFetcher};
use orderwatch_lookup::models::FailureKind;
use orderwatch_lookup::services::{BatchOutcome, BatchScheduler, SchedulerConfig};
use orderwatch_lookup::utils::RetryPolicy;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

async fn collect(scheduler: &BatchScheduler, identifiers: &[String]) -> Vec<BatchOutcome> {
    scheduler
        .run(identifiers, CancellationToken::new())
        .collect()
        .await
}

#[tokio::test]
async fn test_5000_ids_three_batches_at_most_three_in_flight() {
    let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(50)));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(2000, 4).with_retry(fast_retry()),
    );
    let identifiers = ids(5000);

    let outcomes = collect(&scheduler, &identifiers).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(fetcher.calls(), 3);
    assert!(fetcher.max_in_flight() <= 3);

    let indices: HashSet<usize> = outcomes.iter().map(|o| o.batch.index).collect();
    assert_eq!(indices, HashSet::from([0, 1, 2]));

    let last = outcomes.last().unwrap();
    assert_eq!(last.progress.processed_identifiers, 5000);
    assert_eq!(last.progress.settled_batches, 3);
    assert_eq!(last.progress.total_batches, 3);
}

#[tokio::test]
async fn test_concurrency_bound_respected() {
    let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(20)));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(10, 2).with_retry(fast_retry()),
    );

    let outcomes = collect(&scheduler, &ids(100)).await;

    assert_eq!(outcomes.len(), 10);
    assert!(fetcher.max_in_flight() <= 2);
    assert_eq!(fetcher.max_in_flight(), 2);
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_others() {
    let fetcher = Arc::new(MockFetcher::new().failing(1));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(2000, 4).with_retry(fast_retry()),
    );

    let outcomes = collect(&scheduler, &ids(5000)).await;

    assert_eq!(outcomes.len(), 3);
    let failed: Vec<&BatchOutcome> = outcomes.iter().filter(|o| o.result.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].batch.index, 1);
    assert_eq!(failed[0].attempts, 3);
    assert_eq!(
        failed[0].result.as_ref().unwrap_err().kind(),
        FailureKind::Server
    );

    let records: usize = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .map(Vec::len)
        .sum();
    assert_eq!(records, 3000);
}

#[tokio::test]
async fn test_transient_failure_retried() {
    let fetcher = Arc::new(MockFetcher::new().flaky(0));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(50, 1).with_retry(fast_retry()),
    );

    let outcomes = collect(&scheduler, &ids(50)).await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].result.is_ok());
    assert_eq!(outcomes[0].attempts, 2);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let fetcher = Arc::new(MockFetcher::new().rejecting(0));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(50, 1).with_retry(fast_retry()),
    );

    let outcomes = collect(&scheduler, &ids(50)).await;

    assert_eq!(outcomes[0].attempts, 1);
    assert_eq!(
        outcomes[0].result.as_ref().unwrap_err().kind(),
        FailureKind::Client
    );
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_stop_prevents_new_dispatch() {
    let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(50)));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(10, 1).with_retry(fast_retry()),
    );
    let stop = CancellationToken::new();
    let identifiers = ids(100);

    let stream = scheduler.run(&identifiers, stop.clone());
    futures::pin_mut!(stream);

    let first = stream.next().await.unwrap();
    assert!(first.result.is_ok());
    stop.cancel();

    let rest: Vec<BatchOutcome> = stream.collect().await;

    // The batch dispatched as the first settled may still finish
    assert!(rest.len() <= 1);
    assert!(fetcher.calls() <= 2);
}

#[tokio::test]
async fn test_cancelled_before_start_dispatches_nothing() {
    let fetcher = Arc::new(MockFetcher::new());
    let scheduler = BatchScheduler::new(fetcher.clone(), SchedulerConfig::new(10, 4));
    let stop = CancellationToken::new();
    stop.cancel();

    let outcomes: Vec<BatchOutcome> = scheduler.run(&ids(100), stop).collect().await;

    assert!(outcomes.is_empty());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_empty_input_yields_nothing() {
    let fetcher = Arc::new(MockFetcher::new());
    let scheduler = BatchScheduler::new(fetcher.clone(), SchedulerConfig::default());

    let outcomes = collect(&scheduler, &[]).await;

    assert!(outcomes.is_empty());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_dropping_stream_aborts_in_flight_batches() {
    let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(200)));
    let scheduler = BatchScheduler::new(
        fetcher.clone(),
        SchedulerConfig::new(10, 2).with_retry(fast_retry()),
    );
    let identifiers = ids(40);

    let mut outcomes = Box::pin(scheduler.run(&identifiers, CancellationToken::new()));
    let first = tokio::time::timeout(Duration::from_millis(50), outcomes.next()).await;
    assert!(first.is_err(), "no batch should settle within 50ms");
    drop(outcomes);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(fetcher.completed(), 0);
}
