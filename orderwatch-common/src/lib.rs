//! # orderwatch Common Library
//!
//! Shared code for the orderwatch services including:
//! - Error types
//! - Bootstrap configuration loading and data folder resolution
//! - Lookup event types and the broadcast event bus
//! - Status-group configuration and remark classification

pub mod config;
pub mod error;
pub mod events;
pub mod status_groups;

pub use error::{Error, Result};
pub use status_groups::{RemarkCategory, StatusGroups};
