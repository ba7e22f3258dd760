//! Filtered/sorted view endpoint

use crate::models::{OrderRecord, QueryRequest};
use crate::services::ExportFormat;
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// POST /lookup/:id/query response: the full filtered sequence
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub total: usize,
    pub rows: Arc<Vec<OrderRecord>>,
}

/// POST /lookup/:id/query
pub async fn query_lookup(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    let (filters, sort) = request.into_specs();
    let rows = state.service.query(session_id, &filters, &sort).await?;

    tracing::debug!(session_id = %session_id, rows = rows.len(), "Query evaluated");

    Ok(Json(QueryResponse {
        total: rows.len(),
        rows,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub format: ExportFormat,
}

/// POST /lookup/:id/export?format=csv|excel
///
/// Same body as the query endpoint; returns the view as a CSV attachment.
pub async fn export_lookup(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<ExportParams>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Response> {
    let (filters, sort) = request.into_specs();
    let body = state
        .service
        .export(session_id, &filters, &sort, params.format)
        .await?;

    let disposition = format!(
        "attachment; filename=\"orderwatch-{}.{}\"",
        session_id,
        params.format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, params.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Build query routes
pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/lookup/:id/query", post(query_lookup))
        .route("/lookup/:id/export", post(export_lookup))
}
