//! Filter/sort engine for result views
//!
//! Views are derived from an immutable `Arc<ResultSet>`. Results are memoized
//! per (data identity, filter, sort); replacing the data `Arc` (for example
//! after a remark edit) invalidates the memo.

use crate::models::{FilterSpec, OrderRecord, ResultSet, SortDirection, SortSpec, REMARK};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use orderwatch_common::status_groups::NULL_SELECTION;
use orderwatch_common::StatusGroups;
use serde::Serialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

/// Memoized views kept per data set before the memo is reset
const MAX_MEMO_ENTRIES: usize = 64;

/// Distinct value of a column with its number of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetValue {
    pub value: String,
    pub count: usize,
}

#[derive(Default)]
struct Memo {
    data: Weak<ResultSet>,
    views: HashMap<(FilterSpec, SortSpec), Arc<Vec<OrderRecord>>>,
}

/// Filter/sort engine with memoized views
pub struct QueryEngine {
    status_groups: Arc<StatusGroups>,
    memo: Mutex<Memo>,
}

impl QueryEngine {
    pub fn new(status_groups: Arc<StatusGroups>) -> Self {
        Self {
            status_groups,
            memo: Mutex::new(Memo::default()),
        }
    }

    pub fn status_groups(&self) -> &StatusGroups {
        &self.status_groups
    }

    /// Filtered and sorted view of `data`
    ///
    /// Repeated calls with the same inputs return the same `Arc`.
    pub fn apply(
        &self,
        data: &Arc<ResultSet>,
        filters: &FilterSpec,
        sort: &SortSpec,
    ) -> Arc<Vec<OrderRecord>> {
        let key = (filters.clone(), sort.clone());

        if let Some(view) = self.memo_lookup(data, &key) {
            return view;
        }

        let view = Arc::new(self.compute(data, filters, sort));
        self.memo_store(data, key, Arc::clone(&view));
        view
    }

    fn memo_lookup(
        &self,
        data: &Arc<ResultSet>,
        key: &(FilterSpec, SortSpec),
    ) -> Option<Arc<Vec<OrderRecord>>> {
        let memo = self.memo.lock().ok()?;
        if !std::ptr::eq(memo.data.as_ptr(), Arc::as_ptr(data)) {
            return None;
        }
        memo.views.get(key).cloned()
    }

    fn memo_store(
        &self,
        data: &Arc<ResultSet>,
        key: (FilterSpec, SortSpec),
        view: Arc<Vec<OrderRecord>>,
    ) {
        // A poisoned memo only costs recomputation
        let Ok(mut memo) = self.memo.lock() else {
            return;
        };
        if !std::ptr::eq(memo.data.as_ptr(), Arc::as_ptr(data)) {
            memo.data = Arc::downgrade(data);
            memo.views.clear();
        } else if memo.views.len() >= MAX_MEMO_ENTRIES {
            memo.views.clear();
        }
        memo.views.insert(key, view);
    }

    fn compute(&self, data: &ResultSet, filters: &FilterSpec, sort: &SortSpec) -> Vec<OrderRecord> {
        let search = filters.search_term();

        let mut rows: Vec<&OrderRecord> = data
            .records()
            .iter()
            .filter(|record| self.matches_columns(record, filters))
            .filter(|record| match &search {
                Some(term) => matches_search(record, term, filters.visible_columns.as_deref()),
                None => true,
            })
            .collect();

        if let Some(column) = &sort.column {
            let mut keyed: Vec<(Option<SortKey>, &OrderRecord)> = rows
                .into_iter()
                .map(|record| (SortKey::parse(record.column_value(column)), record))
                .collect();
            // Stable: ties keep arrival order
            keyed.sort_by(|(a, _), (b, _)| {
                let ordering = compare_keys(a.as_ref(), b.as_ref());
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
            rows = keyed.into_iter().map(|(_, record)| record).collect();
        }

        rows.into_iter().cloned().collect()
    }

    fn matches_columns(&self, record: &OrderRecord, filters: &FilterSpec) -> bool {
        filters
            .columns
            .iter()
            .filter(|(_, selected)| !selected.is_empty())
            .all(|(column, selected)| {
                if column == REMARK {
                    let category = self.status_groups.classify(record.remark.as_deref());
                    selected
                        .iter()
                        .any(|s| self.status_groups.selection_matches(s, &category))
                } else {
                    let value = record.column_value(column);
                    selected.iter().any(|s| value_matches(s, value.as_deref()))
                }
            })
    }

    /// Distinct values of `column` with counts, sorted by value
    ///
    /// Remarks are reported by canonical category so equivalent spellings
    /// collapse into one entry. Absent values are reported as `NULL`.
    pub fn facets(&self, data: &ResultSet, column: &str) -> Vec<FacetValue> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        for record in data.records() {
            let value = if column == REMARK {
                self.status_groups
                    .classify(record.remark.as_deref())
                    .display_name()
                    .to_string()
            } else {
                match record.column_value(column) {
                    Some(v) if !v.is_empty() => v.into_owned(),
                    _ => NULL_SELECTION.to_string(),
                }
            };
            *counts.entry(value).or_default() += 1;
        }

        counts
            .into_iter()
            .map(|(value, count)| FacetValue { value, count })
            .collect()
    }
}

/// Exact match, with `""`/`NULL` selecting absent or empty values
fn value_matches(selected: &str, value: Option<&str>) -> bool {
    if selected.trim().is_empty() || selected == NULL_SELECTION {
        return value.map_or(true, str::is_empty);
    }
    value == Some(selected)
}

/// Case-insensitive substring search over visible columns (all when unspecified)
fn matches_search(record: &OrderRecord, term: &str, visible: Option<&[String]>) -> bool {
    let contains = |value: Option<Cow<'_, str>>| {
        value.is_some_and(|v| v.to_lowercase().contains(term))
    };

    match visible {
        Some(columns) if !columns.is_empty() => {
            columns.iter().any(|c| contains(record.column_value(c)))
        }
        _ => {
            record.identifier.to_lowercase().contains(term)
                || record.columns().any(|c| contains(record.column_value(c)))
        }
    }
}

/// Typed sort key of a present, non-empty value
///
/// Values of different types order numbers, then timestamps, then text so
/// the comparison stays total on mixed columns.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl SortKey {
    fn parse(value: Option<Cow<'_, str>>) -> Option<SortKey> {
        let value = value?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return Some(SortKey::Number(n));
            }
        }

        if let Some(ts) = parse_timestamp(trimmed) {
            return Some(SortKey::Timestamp(ts));
        }

        Some(SortKey::Text(trimmed.to_lowercase()))
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Timestamp(_) => 1,
            SortKey::Text(_) => 2,
        }
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Ascending order; absent values first
fn compare_keys(a: Option<&SortKey>, b: Option<&SortKey>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
            (SortKey::Timestamp(x), SortKey::Timestamp(y)) => x.cmp(y),
            (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
            _ => a.rank().cmp(&b.rank()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_matches_null_selection() {
        assert!(value_matches("NULL", None));
        assert!(value_matches("", Some("")));
        assert!(!value_matches("NULL", Some("x")));
        assert!(value_matches("x", Some("x")));
        assert!(!value_matches("x", Some("X")));
    }

    #[test]
    fn test_sort_key_types() {
        assert_eq!(
            SortKey::parse(Some(Cow::Borrowed("10"))),
            Some(SortKey::Number(10.0))
        );
        assert!(matches!(
            SortKey::parse(Some(Cow::Borrowed("2024-03-01 10:00:00"))),
            Some(SortKey::Timestamp(_))
        ));
        assert!(matches!(
            SortKey::parse(Some(Cow::Borrowed("2024-03-01T10:00:00+07:00"))),
            Some(SortKey::Timestamp(_))
        ));
        assert_eq!(
            SortKey::parse(Some(Cow::Borrowed("Shopee"))),
            Some(SortKey::Text("shopee".to_string()))
        );
        assert_eq!(SortKey::parse(Some(Cow::Borrowed("NaN"))), Some(SortKey::Text("nan".to_string())));
        assert_eq!(SortKey::parse(Some(Cow::Borrowed("  "))), None);
        assert_eq!(SortKey::parse(None), None);
    }

    #[test]
    fn test_numeric_compare_is_not_lexicographic() {
        let nine = SortKey::Number(9.0);
        let ten = SortKey::Number(10.0);
        assert_eq!(compare_keys(Some(&nine), Some(&ten)), Ordering::Less);
    }

    #[test]
    fn test_absent_sorts_first() {
        let text = SortKey::Text("a".to_string());
        assert_eq!(compare_keys(None, Some(&text)), Ordering::Less);
        assert_eq!(compare_keys(None, None), Ordering::Equal);
    }
}
