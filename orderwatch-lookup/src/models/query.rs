//! Filter and sort specifications for result views

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-column value selections plus free-text search
///
/// Columns combine with AND, values selected for one column combine with OR.
/// A column with an empty selection does not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub columns: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub search: Option<String>,
    /// Columns searched by `search`; all columns when absent
    #[serde(default)]
    pub visible_columns: Option<Vec<String>>,
}

impl FilterSpec {
    /// Select `values` for `column`
    pub fn with_column<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .insert(column.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_search(mut self, term: &str) -> Self {
        self.search = Some(term.to_string());
        self
    }

    /// Lowercased search term, `None` when absent or blank
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Single-key sort; no column means arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn by(column: &str, direction: SortDirection) -> Self {
        Self {
            column: Some(column.to_string()),
            direction,
        }
    }
}

/// Body of a view query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub visible_columns: Option<Vec<String>>,
    #[serde(default)]
    pub sort: SortSpec,
}

impl QueryRequest {
    pub fn into_specs(self) -> (FilterSpec, SortSpec) {
        (
            FilterSpec {
                columns: self.filters,
                search: self.search,
                visible_columns: self.visible_columns,
            },
            self.sort,
        )
    }
}
