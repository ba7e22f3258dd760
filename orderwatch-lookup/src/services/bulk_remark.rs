//! Bulk remark edits
//!
//! Parses pasted `identifier<TAB>remark`, `identifier,remark` or
//! `identifier remark` lines into remark edits. Remark spellings of the
//! cancel and pending-verification families are rewritten to one canonical
//! form before they are sent.

use crate::services::normalizer::clean_identifier;
use serde::Serialize;
use thiserror::Error;

/// One parsed line of bulk remark input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemarkEdit {
    /// 1-based line in the pasted text
    pub line_number: usize,
    pub system_ref_id: String,
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkRemarkError {
    #[error("No remark edits in input")]
    Empty,

    #[error("Line {0} has no identifier")]
    MissingIdentifier(usize),

    #[error("Line {0} has no remark")]
    MissingRemark(usize),
}

/// Parse pasted bulk remark text
///
/// Blank lines are skipped. The first malformed line rejects the whole
/// input so nothing is applied from a half-understood paste.
pub fn parse_bulk_remarks(text: &str) -> Result<Vec<RemarkEdit>, BulkRemarkError> {
    let mut edits = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_number = i + 1;
        if clean_identifier(line).is_empty() {
            continue;
        }

        let (id, remark) = split_line(line);
        let id = clean_identifier(id);
        let remark = remark.map(clean_identifier).unwrap_or_default();

        if id.is_empty() {
            return Err(BulkRemarkError::MissingIdentifier(line_number));
        }
        if remark.is_empty() {
            return Err(BulkRemarkError::MissingRemark(line_number));
        }

        edits.push(RemarkEdit {
            line_number,
            system_ref_id: id.to_string(),
            remark: canonical_remark(remark),
        });
    }

    if edits.is_empty() {
        return Err(BulkRemarkError::Empty);
    }
    Ok(edits)
}

/// Split at the first tab, else the first comma, else the first whitespace run
fn split_line(line: &str) -> (&str, Option<&str>) {
    if let Some((id, remark)) = line.split_once('\t') {
        return (id, Some(remark));
    }
    if let Some((id, remark)) = line.split_once(',') {
        return (id, Some(remark));
    }

    let trimmed = line.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((id, remark)) => (id, Some(remark)),
        None => (trimmed, None),
    }
}

/// Canonical spelling of a remark
///
/// `cancel`/`cancelled`/`canceled` → `Cancel`, `in_cancel`/`in cancel` →
/// `IN_Cancel`, anything mentioning pending and verifikasi →
/// `Pending Verifikasi`. Other remarks are kept with inner whitespace
/// collapsed.
pub fn canonical_remark(remark: &str) -> String {
    let lower = remark.trim().to_lowercase();

    match lower.as_str() {
        "cancel" | "cancelled" | "canceled" => return "Cancel".to_string(),
        "in_cancel" => return "IN_Cancel".to_string(),
        _ => {}
    }
    if lower.contains("in cancel") {
        return "IN_Cancel".to_string();
    }
    if lower.contains("pending") && lower.contains("verifikasi") {
        return "Pending Verifikasi".to_string();
    }

    remark.split_whitespace().collect::<Vec<_>>().join(" ")
}
