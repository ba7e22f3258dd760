//! Utility modules for orderwatch-lookup

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
