//! CSV export of result views
//!
//! Every field is quoted. The Excel flavor prefixes a UTF-8 byte order mark
//! so spreadsheet applications detect the encoding.

use crate::models::{OrderRecord, REMARK};
use serde::Deserialize;
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Output flavor of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Excel => "application/vnd.ms-excel; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xls",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),
}

/// Export columns: `columns` when given, else every column in first-seen
/// order with `Remark` last
pub fn export_columns(records: &[OrderRecord], columns: Option<&[String]>) -> Vec<String> {
    if let Some(columns) = columns.filter(|c| !c.is_empty()) {
        return columns.to_vec();
    }

    let mut seen: Vec<String> = Vec::new();
    for record in records {
        for column in record.fields.keys() {
            if column != REMARK && !seen.iter().any(|c| c == column) {
                seen.push(column.clone());
            }
        }
    }
    seen.push(REMARK.to_string());
    seen
}

/// Write `records` as CSV with a header row
///
/// Absent and null values are written as empty fields.
pub fn write_csv(
    records: &[OrderRecord],
    columns: &[String],
    format: ExportFormat,
) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    if format == ExportFormat::Excel {
        buffer.extend_from_slice(UTF8_BOM);
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(buffer);

    writer.write_record(columns)?;
    for record in records {
        writer.write_record(
            columns
                .iter()
                .map(|c| record.column_value(c).unwrap_or_default().into_owned()),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.error().to_string()))
}
