//! Status-group configuration and remark classification
//!
//! Remarks are free text typed by operators ("cancel", "in_cancel",
//! "Pending verfikasi", ...). Every consumer that needs to group them (filters,
//! summary counts, charts) goes through [`StatusGroups::classify`] so the
//! grouping rules live in one place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selection value that matches records without a remark
pub const NULL_SELECTION: &str = "NULL";

/// One canonical remark group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusGroup {
    /// Canonical group name shown to operators
    pub name: String,
    /// Substrings that place a remark in this group (matched case-insensitively)
    pub patterns: Vec<String>,
    /// Display color for charts (hex)
    #[serde(default = "default_color")]
    pub color: String,
    /// Lower number is tested first
    pub priority: u32,
}

fn default_color() -> String {
    "#64748b".to_string()
}

/// Canonical category of a remark
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RemarkCategory {
    /// No remark (absent, null or blank)
    Unset,
    /// Remark matched a configured group
    Group(String),
    /// Remark matched no group; holds the lowercased, trimmed text
    Unclassified(String),
}

impl RemarkCategory {
    /// Name used for display and facet values
    pub fn display_name(&self) -> &str {
        match self {
            RemarkCategory::Unset => NULL_SELECTION,
            RemarkCategory::Group(name) => name,
            RemarkCategory::Unclassified(text) => text,
        }
    }
}

/// Status-group configuration
///
/// Groups are kept sorted by priority. `filter_aliases` names umbrella
/// selections that cover several groups at once (e.g. `Cancel` covers both
/// `IN_Cancel` and `Cancelled`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StatusGroupsConfig")]
pub struct StatusGroups {
    groups: Vec<StatusGroup>,
    filter_aliases: BTreeMap<String, Vec<String>>,
}

/// Raw TOML/JSON shape of the status-group configuration
#[derive(Debug, Clone, Deserialize)]
struct StatusGroupsConfig {
    #[serde(default)]
    groups: Vec<StatusGroup>,
    #[serde(default)]
    filter_aliases: BTreeMap<String, Vec<String>>,
}

impl From<StatusGroupsConfig> for StatusGroups {
    fn from(config: StatusGroupsConfig) -> Self {
        StatusGroups::new(config.groups, config.filter_aliases)
    }
}

impl StatusGroups {
    pub fn new(mut groups: Vec<StatusGroup>, filter_aliases: BTreeMap<String, Vec<String>>) -> Self {
        // Stable sort keeps declaration order for equal priorities
        groups.sort_by_key(|g| g.priority);
        Self {
            groups,
            filter_aliases,
        }
    }

    /// Groups in priority order
    pub fn groups(&self) -> &[StatusGroup] {
        &self.groups
    }

    pub fn filter_aliases(&self) -> &BTreeMap<String, Vec<String>> {
        &self.filter_aliases
    }

    /// Classify a raw remark into its canonical category
    ///
    /// The first group (by priority) having a pattern contained in the
    /// lowercased remark wins.
    pub fn classify(&self, remark: Option<&str>) -> RemarkCategory {
        let normalized = match remark.map(|r| r.trim().to_lowercase()) {
            Some(n) if !n.is_empty() => n,
            _ => return RemarkCategory::Unset,
        };

        for group in &self.groups {
            let hit = group
                .patterns
                .iter()
                .any(|pattern| normalized.contains(&pattern.trim().to_lowercase()));
            if hit {
                return RemarkCategory::Group(group.name.clone());
            }
        }

        RemarkCategory::Unclassified(normalized)
    }

    /// Does a filter selection cover a record's remark category?
    ///
    /// `""` and `NULL` select records without a remark. Alias names select
    /// every group they list. Any other selection is classified itself and
    /// compared by category, so "cancelled" and "canceled" select the same
    /// records.
    pub fn selection_matches(&self, selected: &str, category: &RemarkCategory) -> bool {
        let trimmed = selected.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NULL_SELECTION) {
            return *category == RemarkCategory::Unset;
        }

        if let Some(members) = self
            .filter_aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
            .map(|(_, members)| members)
        {
            return match category {
                RemarkCategory::Group(name) => members.iter().any(|m| m == name),
                _ => false,
            };
        }

        self.classify(Some(trimmed)) == *category
    }
}

impl Default for StatusGroups {
    fn default() -> Self {
        let group = |name: &str, patterns: &[&str], color: &str, priority: u32| StatusGroup {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            color: color.to_string(),
            priority,
        };

        let groups = vec![
            group(
                "Pending Verifikasi",
                &["pending verifikasi", "pending verfikasi"],
                "#0ea5e9",
                1,
            ),
            group(
                "IN_Cancel",
                &["in_cancel", "in cancel", "in cancelled", "in_cancelled"],
                "#a78bfa",
                2,
            ),
            // Must be tested before the generic "cancel" pattern
            group("Request Cancel By Client", &["request cancel"], "#f472b6", 3),
            group(
                "Cancelled",
                &["canceled", "cancellations", "cncled", "cancel"],
                "#8b5cf6",
                4,
            ),
            group(
                "Fulfilled by Shopee",
                &["fulfilled by shopee", "fullfiled by shopee"],
                "#f472b6",
                5,
            ),
            group(
                "Transporter Blank",
                &["transporter blank", "tansporter blank"],
                "#8b5cf6",
                6,
            ),
        ];

        let mut filter_aliases = BTreeMap::new();
        filter_aliases.insert(
            "Cancel".to_string(),
            vec!["IN_Cancel".to_string(), "Cancelled".to_string()],
        );

        StatusGroups::new(groups, filter_aliases)
    }
}
