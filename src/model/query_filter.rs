use crate::model::{Branch, BranchSet, Timestamp};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;

/// Value bound to a query parameter placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    TextList(Vec<String>),
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&Timestamp> for ParamValue {
    fn from(value: &Timestamp) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::TextList(value)
    }
}

pub type QueryParams = HashMap<String, ParamValue>;

fn set_to_list(set: &BranchSet) -> Vec<String> {
    set.iter().cloned().collect()
}

/// Deterministic iteration order for branch/time entries: sorted by the
/// branch-name set so parameter indices never depend on map order.
fn ordered_entries(
    scope: &HashMap<BranchSet, Timestamp>,
) -> Vec<(&BranchSet, &Timestamp)> {
    scope.iter().sorted_by(|a, b| a.0.cmp(b.0)).collect()
}

/// Temporal query-filter generation.
///
/// Every method renders boolean predicates (plus a parameter map) over
/// named edge variables. Per branch/time entry an edge is visible when it
/// is currently active (`to` null, `from <= time`) or was active during
/// the window (`to >= time`); entries are OR-ed together and separate
/// relationship labels are AND-ed by the caller.
impl Branch {
    /// Point-in-time filters, one predicate per relationship label.
    pub fn get_query_filter_relationships(
        &self,
        rel_labels: &[&str],
        at: &Timestamp,
        include_outside_parentheses: bool,
    ) -> (Vec<String>, QueryParams) {
        let scope = self.get_branches_and_times_to_query(at);
        let entries = ordered_entries(&scope);

        let mut params = QueryParams::new();
        for (idx, (branches, time)) in entries.iter().enumerate() {
            params.insert(format!("branch{idx}"), set_to_list(branches).into());
            params.insert(format!("time{idx}"), (*time).into());
        }

        let mut filters = Vec::with_capacity(rel_labels.len());
        for rel in rel_labels {
            let mut per_rel = Vec::with_capacity(entries.len() * 2);
            for (idx, _) in entries.iter().enumerate() {
                per_rel.push(format!(
                    "({rel}.branch IN $branch{idx} AND {rel}.from <= $time{idx} AND {rel}.to IS NULL)"
                ));
                per_rel.push(format!(
                    "({rel}.branch IN $branch{idx} AND {rel}.from <= $time{idx} AND {rel}.to >= $time{idx})"
                ));
            }
            let joined = per_rel.join("\n OR ");
            if include_outside_parentheses {
                filters.push(format!("(\n{joined}\n)"));
            } else {
                filters.push(joined);
            }
        }

        (filters, params)
    }

    /// Single-variable filter for variable-length path queries; includes
    /// the global branch in every entry.
    pub fn get_query_filter_path(
        &self,
        at: &Timestamp,
        include_isolation: bool,
    ) -> (String, QueryParams) {
        let scope = self.get_branches_and_times_to_query_global(at, include_isolation);
        let entries = ordered_entries(&scope);

        let mut params = QueryParams::new();
        let mut per_entry = Vec::with_capacity(entries.len());
        for (idx, (branches, time)) in entries.iter().enumerate() {
            params.insert(format!("branch{idx}"), set_to_list(branches).into());
            params.insert(format!("time{idx}"), (*time).into());
            per_entry.push(format!(
                "(r.branch IN $branch{idx} AND r.from <= $time{idx} AND (r.to IS NULL OR r.to >= $time{idx}))"
            ));
        }

        (format!("({})", per_entry.join(" OR ")), params)
    }

    /// Window filters: everything visible at some point in [start, end].
    pub fn get_query_filter_relationships_range(
        &self,
        rel_labels: &[&str],
        start: &Timestamp,
        end: &Timestamp,
        include_outside_parentheses: bool,
    ) -> (Vec<String>, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("branches".to_string(), self.get_branches_in_scope().into());
        params.insert("start_time".to_string(), start.into());
        params.insert("end_time".to_string(), end.into());

        let mut filters = Vec::with_capacity(rel_labels.len());
        for rel in rel_labels {
            let active = format!(
                "({rel}.branch IN $branches AND {rel}.from <= $end_time AND {rel}.to IS NULL)"
            );
            let overlapped = format!(
                "({rel}.branch IN $branches AND {rel}.from <= $end_time AND {rel}.to >= $start_time)"
            );
            let joined = format!("{active}\n OR {overlapped}");
            if include_outside_parentheses {
                filters.push(format!("(\n{joined}\n)"));
            } else {
                filters.push(joined);
            }
        }

        (filters, params)
    }

    /// Diff filters: edges created or closed inside the per-branch window.
    ///
    /// Edges flagged `conflict = "drop"` lost a rebase conflict and are
    /// excluded from the created-in-window side.
    pub fn get_query_filter_relationships_diff(
        &self,
        rel_labels: &[&str],
        diff_from: &Timestamp,
        diff_to: &Timestamp,
    ) -> (Vec<String>, QueryParams) {
        let (start_times, end_times) = self.get_branches_and_times_for_range(diff_from, diff_to);
        let branch_names: Vec<&String> = start_times.keys().sorted().collect();

        let mut params = QueryParams::new();
        for (idx, name) in branch_names.iter().enumerate() {
            params.insert(format!("branch{idx}"), (*name).clone().into());
            if let Some(start) = start_times.get(*name) {
                params.insert(format!("start{idx}"), start.into());
            }
            if let Some(end) = end_times.get(*name) {
                params.insert(format!("end{idx}"), end.into());
            }
        }

        let mut filters = Vec::with_capacity(rel_labels.len());
        for rel in rel_labels {
            let mut per_rel = Vec::with_capacity(branch_names.len() * 2);
            for (idx, _) in branch_names.iter().enumerate() {
                per_rel.push(format!(
                    "({rel}.branch = $branch{idx} AND {rel}.from >= $start{idx} AND {rel}.from <= $end{idx} \
                     AND ({rel}.conflict IS NULL OR {rel}.conflict <> \"drop\"))"
                ));
                per_rel.push(format!(
                    "({rel}.branch = $branch{idx} AND {rel}.to >= $start{idx} AND {rel}.to <= $end{idx})"
                ));
            }
            filters.push(format!("(\n{}\n)", per_rel.join("\n OR ")));
        }

        (filters, params)
    }

    /// Single-label window filter over the branches in scope.
    pub fn get_query_filter_range(
        &self,
        rel_label: &str,
        start: &Timestamp,
        end: &Timestamp,
    ) -> (String, QueryParams) {
        let (mut filters, params) =
            self.get_query_filter_relationships_range(&[rel_label], start, end, true);
        (filters.remove(0), params)
    }
}
