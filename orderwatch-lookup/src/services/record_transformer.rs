//! Record transformer
//!
//! Maps raw monitoring rows into [`OrderRecord`]s and merges them into the
//! working [`ResultSet`]. Large batches are processed in chunks, yielding to
//! the runtime between chunks so progress events and HTTP handlers stay
//! responsive while tens of thousands of rows are merged.

use crate::models::{
    OrderRecord, RawRecord, ResultSet, ORDER_NUMBER, REMARK, STATUS_INTERFACED, SYSTEM_REF_ID,
};
use crate::services::normalizer::clean_identifier;
use serde_json::Value;

/// Textual value of an identifier field, cleaned; `None` when absent or blank
fn identifier_field(raw: &RawRecord, key: &str) -> Option<String> {
    let text = match raw.get(key)? {
        Value::String(s) => clean_identifier(s).to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn parse_interfaced(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::String(s) => match s.trim() {
            v if v.eq_ignore_ascii_case("yes") => Some(true),
            v if v.eq_ignore_ascii_case("no") => Some(false),
            _ => None,
        },
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Map one raw row to a record
///
/// Returns `None` for rows with neither an order number nor a system
/// reference id.
pub fn transform(mut raw: RawRecord) -> Option<OrderRecord> {
    let identifier =
        identifier_field(&raw, ORDER_NUMBER).or_else(|| identifier_field(&raw, SYSTEM_REF_ID))?;

    if let Some(Value::String(system_ref_id)) = raw.get_mut(SYSTEM_REF_ID) {
        let cleaned = clean_identifier(system_ref_id);
        if cleaned.len() != system_ref_id.len() {
            *system_ref_id = cleaned.to_string();
        }
    }

    let remark = match raw.remove(REMARK) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Null) | Some(Value::String(_)) | None => None,
        Some(other) => Some(other.to_string()),
    };

    let status_interfaced = parse_interfaced(raw.get(STATUS_INTERFACED));

    Some(OrderRecord {
        identifier,
        status_interfaced,
        remark,
        fields: raw,
    })
}

/// Chunked merge of raw rows into a result set
#[derive(Debug, Clone, Copy)]
pub struct RecordTransformer {
    chunk_size: usize,
}

impl RecordTransformer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Merge `records` into `existing`, keyed by identifier
    ///
    /// A later row for an identifier replaces the earlier one in place.
    pub async fn merge(&self, mut existing: ResultSet, records: Vec<RawRecord>) -> ResultSet {
        let total = records.len();
        let mut discarded = 0usize;
        let mut rows = records.into_iter().peekable();

        while rows.peek().is_some() {
            for raw in rows.by_ref().take(self.chunk_size) {
                match transform(raw) {
                    Some(record) => existing.upsert(record),
                    None => discarded += 1,
                }
            }
            if rows.peek().is_some() {
                tokio::task::yield_now().await;
            }
        }

        if discarded > 0 {
            tracing::warn!(total, discarded, "Discarded rows without an identifier");
        }

        existing
    }
}

impl Default for RecordTransformer {
    fn default() -> Self {
        Self::new(1000)
    }
}
