//! Summary counts for a lookup result

use crate::models::ResultSet;
use orderwatch_common::{RemarkCategory, StatusGroups};
use serde::Serialize;
use std::collections::BTreeMap;

/// Headline numbers for a result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupSummary {
    pub total_records: usize,
    pub missing: usize,
    pub interfaced: usize,
    pub not_interfaced: usize,
    /// Status_Interfaced absent or unrecognized
    pub interface_unknown: usize,
    /// Records per configured remark group; every group is listed, zero included
    pub remark_groups: BTreeMap<String, usize>,
    pub remark_unset: usize,
    pub remark_unclassified: usize,
}

/// Count records by interface status and remark category
pub fn summarize(result: &ResultSet, groups: &StatusGroups) -> LookupSummary {
    let mut summary = LookupSummary {
        total_records: result.len(),
        missing: result.missing().len(),
        remark_groups: groups
            .groups()
            .iter()
            .map(|g| (g.name.clone(), 0))
            .collect(),
        ..Default::default()
    };

    for record in result.records() {
        match record.status_interfaced {
            Some(true) => summary.interfaced += 1,
            Some(false) => summary.not_interfaced += 1,
            None => summary.interface_unknown += 1,
        }

        match groups.classify(record.remark.as_deref()) {
            RemarkCategory::Unset => summary.remark_unset += 1,
            RemarkCategory::Group(name) => *summary.remark_groups.entry(name).or_default() += 1,
            RemarkCategory::Unclassified(_) => summary.remark_unclassified += 1,
        }
    }

    summary
}
