use crate::model::Timestamp;
use crate::store::traits::{EdgeConflict, EdgeRecord, RebaseActions, Store};
use anyhow::Result;

/// Classify every edge of a branch against the rebase point.
///
/// An edge lands in exactly one of two buckets:
/// - extend: still-valid intervals whose `from` advances to the rebase
///   point (open edges created before `at`, and closed edges whose `to`
///   has not passed yet)
/// - delete: superseded intervals (open edges created after `at`, edges
///   already closed before `at`, and every conflict loser marked `drop`
///   regardless of timing)
pub fn classify_edges(edges: &[EdgeRecord], at: &Timestamp) -> RebaseActions {
    let mut actions = RebaseActions::default();
    for edge in edges {
        if edge.conflict == Some(EdgeConflict::Drop) {
            actions.delete.push(edge.element_id.clone());
            continue;
        }
        match edge.to {
            None if edge.from <= *at => actions.extend.push(edge.element_id.clone()),
            None => actions.delete.push(edge.element_id.clone()),
            Some(to) if to < *at => actions.delete.push(edge.element_id.clone()),
            Some(_) => actions.extend.push(edge.element_id.clone()),
        }
    }
    actions
}

/// Reconcile a branch's own edges after its fork point moved to `at`.
///
/// Fetches the full edge set, classifies it, and hands both batches to the
/// store in one call so the caller never observes a partially rebased
/// graph.
pub async fn rebase_graph<S: Store>(
    store: &S,
    branch: &str,
    at: &Timestamp,
) -> Result<RebaseActions> {
    let edges = store.list_edges_for_branch(branch).await?;
    let actions = classify_edges(&edges, at);
    log::debug!(
        "rebase of '{}' at {}: {} edges to extend, {} to delete",
        branch,
        at,
        actions.extend.len(),
        actions.delete.len()
    );
    store.apply_rebase(branch, &actions, at).await?;
    Ok(actions)
}
