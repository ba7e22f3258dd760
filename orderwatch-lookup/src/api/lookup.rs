//! Lookup session endpoints
//!
//! POST /lookup starts a background lookup and returns immediately; progress
//! is available from GET /lookup/:id and the SSE stream.

use crate::models::{BatchFailure, LookupSession};
use crate::services::{normalize, FacetValue, LookupSummary, StartedLookup};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// POST /lookup request
#[derive(Debug, Deserialize)]
pub struct StartLookupRequest {
    /// Pasted identifiers (newline, comma or semicolon separated)
    pub text: String,
    /// Skip the cache and fetch everything
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /lookup/:id/cancel response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub session_id: Uuid,
    /// False when the session had already finished
    pub cancel_requested: bool,
}

/// GET /lookup/:id/missing response
#[derive(Debug, Serialize)]
pub struct MissingResponse {
    pub session_id: Uuid,
    pub count: usize,
    pub missing: Vec<String>,
    /// Batches whose identifiers are missing because the fetch failed
    pub failures: Vec<BatchFailure>,
}

/// GET /lookup/:id/facets/:column response
#[derive(Debug, Serialize)]
pub struct FacetsResponse {
    pub column: String,
    pub values: Vec<FacetValue>,
}

/// POST /lookup
pub async fn start_lookup(
    State(state): State<AppState>,
    Json(request): Json<StartLookupRequest>,
) -> ApiResult<(StatusCode, Json<StartedLookup>)> {
    let identifiers = normalize(&request.text);
    if identifiers.is_empty() {
        return Err(ApiError::BadRequest(
            "No identifiers found in input".to_string(),
        ));
    }

    let started = state.service.start(identifiers, request.force_refresh).await;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// GET /lookup/:id
pub async fn get_lookup(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<LookupSession>> {
    Ok(Json(state.service.snapshot(session_id).await?))
}

/// POST /lookup/:id/cancel
pub async fn cancel_lookup(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let cancel_requested = state.service.cancel(session_id).await?;
    Ok(Json(CancelResponse {
        session_id,
        cancel_requested,
    }))
}

/// GET /lookup/:id/missing
pub async fn get_missing(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<MissingResponse>> {
    let result = state.service.result(session_id).await?;
    let failures = state.service.snapshot(session_id).await?.failures;

    Ok(Json(MissingResponse {
        session_id,
        count: result.missing().len(),
        missing: result.missing().to_vec(),
        failures,
    }))
}

/// GET /lookup/:id/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<LookupSummary>> {
    Ok(Json(state.service.summary(session_id).await?))
}

/// GET /lookup/:id/facets/:column
pub async fn get_facets(
    State(state): State<AppState>,
    Path((session_id, column)): Path<(Uuid, String)>,
) -> ApiResult<Json<FacetsResponse>> {
    let values = state.service.facets(session_id, &column).await?;
    Ok(Json(FacetsResponse { column, values }))
}

/// Build lookup routes
pub fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/lookup", post(start_lookup))
        .route("/lookup/:id", get(get_lookup))
        .route("/lookup/:id/cancel", post(cancel_lookup))
        .route("/lookup/:id/missing", get(get_missing))
        .route("/lookup/:id/summary", get(get_summary))
        .route("/lookup/:id/facets/:column", get(get_facets))
}
