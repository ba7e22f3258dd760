//! Monitoring service client
//!
//! One HTTP round-trip per call; retry policy belongs to the batch scheduler.
//! Failures are classified so the scheduler can decide what is worth
//! retrying.

use crate::models::{FailureKind, RawRecord};
use crate::services::batch_scheduler::Batch;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const QUERY_PATH: &str = "query/monitoring";
const REMARK_PATH: &str = "monitoring/remark";
const USER_AGENT: &str = concat!("orderwatch/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt carried into an error message
const MAX_ERROR_BODY: usize = 200;

/// Remote fetch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection refused, reset, DNS failure...
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// 4xx: the request itself is wrong, retrying cannot help
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    /// 5xx
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body was not the expected shape
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The fetch task itself died (panic or runtime shutdown)
    #[error("Fetch task failed: {0}")]
    Internal(String),
}

impl FetchError {
    /// Transient failures that a later attempt may not hit
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_) | FetchError::Timeout(_) | FetchError::Server { .. }
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Transport(_) => FailureKind::Transport,
            FetchError::Timeout(_) => FailureKind::Timeout,
            FetchError::Client { .. } => FailureKind::Client,
            FetchError::Server { .. } => FailureKind::Server,
            FetchError::Decode(_) => FailureKind::Decode,
            FetchError::Internal(_) => FailureKind::Internal,
        }
    }

    /// HTTP status for client/server failures
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Client { status, .. } | FetchError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build the error for a non-success HTTP response
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = error_message(status, body);
        if status.is_server_error() {
            FetchError::Server {
                status: status.as_u16(),
                message,
            }
        } else {
            FetchError::Client {
                status: status.as_u16(),
                message,
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Error text from a failed response
///
/// Prefers the JSON body's `error` field, then `details`, then a trimmed
/// excerpt of the raw body, then the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "details"] {
            match map.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }

    let excerpt = body.trim();
    if !excerpt.is_empty() {
        return excerpt.chars().take(MAX_ERROR_BODY).collect();
    }

    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

/// Source of order records for one batch
#[async_trait]
pub trait BatchFetcher: Send + Sync {
    /// Fetch the records of one batch in a single attempt
    async fn fetch(&self, batch: &Batch) -> Result<Vec<RawRecord>, FetchError>;
}

/// Sink for operator remark edits
#[async_trait]
pub trait RemarkWriter: Send + Sync {
    async fn update_remark(
        &self,
        system_ref_id: &str,
        remark: Option<&str>,
    ) -> Result<(), FetchError>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    results: Option<Vec<RawRecord>>,
}

/// HTTP client for the monitoring service
pub struct MonitoringClient {
    http_client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl MonitoringClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body and return the raw response text on success
    async fn post_json(&self, path: &str, body: &Value) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "Monitoring service returned error");
            return Err(FetchError::from_status(status, &text));
        }

        Ok(text)
    }
}

#[async_trait]
impl BatchFetcher for MonitoringClient {
    async fn fetch(&self, batch: &Batch) -> Result<Vec<RawRecord>, FetchError> {
        tracing::debug!(
            batch = batch.index,
            identifiers = batch.identifiers.len(),
            "Querying monitoring service"
        );

        let body = json!({ "system_ref_ids": batch.identifiers });
        let text = self.post_json(QUERY_PATH, &body).await?;

        let parsed: QueryResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(parsed
            .data
            .and_then(|data| data.results)
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemarkWriter for MonitoringClient {
    async fn update_remark(
        &self,
        system_ref_id: &str,
        remark: Option<&str>,
    ) -> Result<(), FetchError> {
        let body = json!({ "system_ref_id": system_ref_id, "remark": remark });
        self.post_json(REMARK_PATH, &body).await?;
        tracing::info!(system_ref_id = %system_ref_id, "Remark updated on monitoring service");
        Ok(())
    }
}
