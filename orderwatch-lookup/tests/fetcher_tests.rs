//! Monitoring client tests against a local mock of the remote service

mod helpers;

use axum::http::StatusCode;
use helpers::mock_remote::{start_mock_remote, QueryBehavior};
use orderwatch_lookup::models::FailureKind;
use orderwatch_lookup::services::{Batch, BatchFetcher, FetchError, MonitoringClient, RemarkWriter};
use std::time::Duration;

fn batch(ids: &[&str]) -> Batch {
    Batch {
        index: 0,
        identifiers: ids.iter().map(|s| s.to_string()).collect(),
    }
}

fn client(base_url: &str, token: Option<&str>) -> MonitoringClient {
    MonitoringClient::new(base_url, token.map(str::to_string), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_posts_ids_with_bearer_token() {
    let remote = start_mock_remote(QueryBehavior::Echo).await;
    let client = client(&remote.base_url(), Some("secret-token"));

    let records = client.fetch(&batch(&["SO-1", "SO-2"])).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["SystemRefId"], "SO-1");

    let recorded = remote.recorded.lock().unwrap();
    assert_eq!(
        recorded.authorization[0].as_deref(),
        Some("Bearer secret-token")
    );
    assert_eq!(
        recorded.query_bodies[0]["system_ref_ids"],
        serde_json::json!(["SO-1", "SO-2"])
    );
}

#[tokio::test]
async fn test_no_token_sends_no_authorization() {
    let remote = start_mock_remote(QueryBehavior::Echo).await;
    let client = client(&remote.base_url(), None);

    client.fetch(&batch(&["SO-1"])).await.unwrap();

    assert_eq!(remote.recorded.lock().unwrap().authorization[0], None);
}

#[tokio::test]
async fn test_absent_results_is_empty() {
    let remote = start_mock_remote(QueryBehavior::NoResults).await;
    let client = client(&remote.base_url(), None);

    let records = client.fetch(&batch(&["SO-1"])).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_unauthorized_is_client_error_with_message() {
    let remote = start_mock_remote(QueryBehavior::Status(
        StatusCode::UNAUTHORIZED,
        r#"{"error": "Missing or invalid Authorization header"}"#.to_string(),
    ))
    .await;
    let client = client(&remote.base_url(), None);

    let err = client.fetch(&batch(&["SO-1"])).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Client);
    assert_eq!(err.status(), Some(401));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Missing or invalid Authorization header"));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let remote = start_mock_remote(QueryBehavior::Status(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"details": "database unavailable"}"#.to_string(),
    ))
    .await;
    let client = client(&remote.base_url(), None);

    let err = client.fetch(&batch(&["SO-1"])).await.unwrap_err();

    assert_eq!(
        err,
        FetchError::Server {
            status: 500,
            message: "database unavailable".to_string()
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let remote = start_mock_remote(QueryBehavior::Garbage).await;
    let client = client(&remote.base_url(), None);

    let err = client.fetch(&batch(&["SO-1"])).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Decode);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}", addr), None);
    let err = client.fetch(&batch(&["SO-1"])).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transport);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_update_remark_posts_body() {
    let remote = start_mock_remote(QueryBehavior::Echo).await;
    let client = client(&remote.base_url(), Some("t"));

    client.update_remark("SO-1", Some("Cancelled")).await.unwrap();
    client.update_remark("SO-2", None).await.unwrap();

    let recorded = remote.recorded.lock().unwrap();
    assert_eq!(
        recorded.remark_bodies[0],
        serde_json::json!({ "system_ref_id": "SO-1", "remark": "Cancelled" })
    );
    assert_eq!(
        recorded.remark_bodies[1],
        serde_json::json!({ "system_ref_id": "SO-2", "remark": null })
    );
}
