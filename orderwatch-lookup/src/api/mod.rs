//! HTTP API handlers for orderwatch-lookup

pub mod health;
pub mod lookup;
pub mod query;
pub mod remark;
pub mod sse;
pub mod status_groups;

pub use health::health_routes;
pub use lookup::lookup_routes;
pub use query::query_routes;
pub use remark::remark_routes;
pub use sse::event_stream;
pub use status_groups::status_group_routes;
