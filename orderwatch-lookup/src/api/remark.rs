//! Remark edit endpoint

use crate::models::OrderRecord;
use crate::services::BulkRemarkReport;
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// POST /lookup/:id/remark request
#[derive(Debug, Deserialize)]
pub struct RemarkRequest {
    pub system_ref_id: String,
    /// New remark; null or empty clears it
    #[serde(default)]
    pub remark: Option<String>,
}

/// POST /lookup/:id/remark response
#[derive(Debug, Serialize)]
pub struct RemarkResponse {
    pub record: OrderRecord,
    /// Whether the cache entry was rewritten with the edit
    pub cache_refreshed: bool,
}

/// POST /lookup/:id/remark
///
/// Round-trips the edit to the monitoring service first; the local result
/// and the cache are only updated once the remote accepted it.
pub async fn update_remark(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RemarkRequest>,
) -> ApiResult<Json<RemarkResponse>> {
    let record = state
        .service
        .update_remark(session_id, request.system_ref_id.trim(), request.remark)
        .await?;
    let cache_refreshed = state.service.refresh_cache(session_id).await?;

    Ok(Json(RemarkResponse {
        record,
        cache_refreshed,
    }))
}

/// POST /lookup/:id/remarks/bulk request
#[derive(Debug, Deserialize)]
pub struct BulkRemarkRequest {
    /// One `identifier<TAB>remark` (or `identifier,remark`) per line
    pub text: String,
    /// Report matches without writing anything
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /lookup/:id/remarks/bulk
pub async fn bulk_update_remarks(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<BulkRemarkRequest>,
) -> ApiResult<Json<BulkRemarkReport>> {
    let report = state
        .service
        .bulk_update_remarks(session_id, &request.text, request.dry_run)
        .await?;
    Ok(Json(report))
}

/// Build remark routes
pub fn remark_routes() -> Router<AppState> {
    Router::new()
        .route("/lookup/:id/remark", post(update_remark))
        .route("/lookup/:id/remarks/bulk", post(bulk_update_remarks))
}
