//! Order status record as returned by the monitoring service

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Raw JSON object for one order, as received from the remote service
pub type RawRecord = serde_json::Map<String, Value>;

/// Column holding the marketplace order number (preferred identifier)
pub const ORDER_NUMBER: &str = "Order Number";
/// Column holding the internal system reference id (fallback identifier)
pub const SYSTEM_REF_ID: &str = "SystemRefId";
/// Free-text operator remark
pub const REMARK: &str = "Remark";
/// "Yes"/"No" interface flag
pub const STATUS_INTERFACED: &str = "Status_Interfaced";

/// One order status row
///
/// `fields` carries every column of the remote row except `Remark`, which is
/// lifted into `remark` so it can be edited and classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub identifier: String,
    pub status_interfaced: Option<bool>,
    pub remark: Option<String>,
    pub fields: RawRecord,
}

impl OrderRecord {
    /// Value of a column as text, `None` when absent or null
    ///
    /// Strings are returned verbatim; numbers and booleans use their JSON
    /// text. The identifier columns fall back to `identifier`.
    pub fn column_value(&self, column: &str) -> Option<Cow<'_, str>> {
        if column == REMARK {
            return self.remark.as_deref().map(Cow::Borrowed);
        }

        match self.fields.get(column) {
            Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Cow::Borrowed(s.as_str())),
            Some(other) => Some(Cow::Owned(other.to_string())),
            None if column == ORDER_NUMBER || column == SYSTEM_REF_ID => {
                Some(Cow::Borrowed(self.identifier.as_str()))
            }
            None => None,
        }
    }

    /// Column names present on this record, `Remark` included
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(REMARK).chain(self.fields.keys().map(String::as_str))
    }
}
