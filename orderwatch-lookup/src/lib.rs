//! orderwatch-lookup library interface
//!
//! Bulk order-status lookup: identifier normalization, persistent result
//! cache, bounded-concurrency batch fetching, incremental merge and
//! memoized filter/sort views, exposed over HTTP with SSE progress.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use orderwatch_common::events::EventBus;
use services::LookupService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Lookup pipeline and session registry
    pub service: Arc<LookupService>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<LookupService>) -> Self {
        let event_bus = service.event_bus().clone();
        Self {
            service,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::lookup_routes())
        .merge(api::query_routes())
        .merge(api::remark_routes())
        .merge(api::status_group_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
