//! Accumulated lookup result: records in arrival order plus missing identifiers

use super::order_record::{OrderRecord, SYSTEM_REF_ID};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Records keyed by identifier, plus the identifiers nothing was found for
///
/// Once [`ResultSet::finalize`] has run, every requested identifier is in
/// exactly one of `records` or `missing`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredResultSet")]
pub struct ResultSet {
    records: Vec<OrderRecord>,
    missing: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Serialized form; the identifier index is rebuilt on load
#[derive(Deserialize)]
struct StoredResultSet {
    #[serde(default)]
    records: Vec<OrderRecord>,
    #[serde(default)]
    missing: Vec<String>,
}

impl From<StoredResultSet> for ResultSet {
    fn from(stored: StoredResultSet) -> Self {
        let mut set = ResultSet::new();
        for record in stored.records {
            set.upsert(record);
        }
        set.missing = stored.missing;
        set
    }
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<&OrderRecord> {
        self.index.get(identifier).map(|&i| &self.records[i])
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Insert a record, replacing an earlier record for the same identifier in place
    pub fn upsert(&mut self, record: OrderRecord) {
        match self.index.get(&record.identifier) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.identifier.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Compute `missing` as the requested identifiers without a record, in request order
    ///
    /// A requested identifier is found when it is a record's identifier or
    /// the `SystemRefId` of a record keyed by its order number.
    pub fn finalize(&mut self, requested: &[String]) {
        let system_ref_ids: HashSet<&str> = self
            .records
            .iter()
            .filter_map(|r| r.fields.get(SYSTEM_REF_ID).and_then(|v| v.as_str()))
            .collect();

        let mut seen = HashSet::new();
        let missing = requested
            .iter()
            .filter(|id| {
                !self.index.contains_key(id.as_str())
                    && !system_ref_ids.contains(id.as_str())
                    && seen.insert(id.as_str())
            })
            .cloned()
            .collect();
        self.missing = missing;
    }

    /// Whether `identifier` was found, directly or by `SystemRefId`
    pub fn covers(&self, identifier: &str) -> bool {
        self.contains(identifier)
            || self.records.iter().any(|r| {
                r.fields.get(SYSTEM_REF_ID).and_then(|v| v.as_str()) == Some(identifier)
            })
    }

    /// Copy of this set with one record's remark replaced
    ///
    /// Returns `None` when no record has that identifier.
    pub fn with_remark(&self, identifier: &str, remark: Option<String>) -> Option<ResultSet> {
        let &i = self.index.get(identifier)?;
        let mut updated = self.clone();
        updated.records[i].remark = remark;
        Some(updated)
    }
}
