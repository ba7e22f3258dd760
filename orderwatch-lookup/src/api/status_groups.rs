//! Status-group configuration endpoint

use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use orderwatch_common::status_groups::StatusGroup;
use serde::Serialize;
use std::collections::BTreeMap;

/// GET /status-groups response
#[derive(Debug, Serialize)]
pub struct StatusGroupsResponse {
    /// Groups in priority order
    pub groups: Vec<StatusGroup>,
    pub filter_aliases: BTreeMap<String, Vec<String>>,
}

/// GET /status-groups
pub async fn get_status_groups(State(state): State<AppState>) -> Json<StatusGroupsResponse> {
    let groups = state.service.status_groups();
    Json(StatusGroupsResponse {
        groups: groups.groups().to_vec(),
        filter_aliases: groups.filter_aliases().clone(),
    })
}

/// Build status-group routes
pub fn status_group_routes() -> Router<AppState> {
    Router::new().route("/status-groups", get(get_status_groups))
}
