//! Department closure table.
//!
//! Every (ancestor, descendant, depth) pair is materialized, including the
//! self pair at depth 0. Rows are only ever added when a department is
//! created; nothing here recomputes the table wholesale.

use serde::{Deserialize, Serialize};

use ainventory_core::DepartmentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub ancestor_id: DepartmentId,
    pub descendant_id: DepartmentId,
    pub depth: i32,
}

impl HierarchyEdge {
    pub fn self_edge(id: DepartmentId) -> Self {
        Self {
            ancestor_id: id,
            descendant_id: id,
            depth: 0,
        }
    }
}

/// Closure rows to insert for a newly created department.
///
/// The self edge, plus one row per existing row whose descendant is the
/// parent, re-pointed at the new department with `depth + 1`. `existing` may
/// contain unrelated rows; only the parent's are used.
pub fn closure_edges_for(
    new_id: DepartmentId,
    parent_id: Option<DepartmentId>,
    existing: &[HierarchyEdge],
) -> Vec<HierarchyEdge> {
    let mut edges = vec![HierarchyEdge::self_edge(new_id)];
    if let Some(parent_id) = parent_id {
        edges.extend(
            existing
                .iter()
                .filter(|edge| edge.descendant_id == parent_id)
                .map(|edge| HierarchyEdge {
                    ancestor_id: edge.ancestor_id,
                    descendant_id: new_id,
                    depth: edge.depth + 1,
                }),
        );
    }
    edges
}

/// Ancestors of `id` (depth > 0), farthest first.
pub fn ancestor_ids(edges: &[HierarchyEdge], id: DepartmentId) -> Vec<DepartmentId> {
    let mut rows: Vec<_> = edges
        .iter()
        .filter(|e| e.descendant_id == id && e.depth > 0)
        .collect();
    rows.sort_by(|a, b| b.depth.cmp(&a.depth).then(a.ancestor_id.cmp(&b.ancestor_id)));
    rows.into_iter().map(|e| e.ancestor_id).collect()
}

/// Descendants of `id` (depth > 0), closest first.
pub fn descendant_ids(edges: &[HierarchyEdge], id: DepartmentId) -> Vec<DepartmentId> {
    let mut rows: Vec<_> = edges
        .iter()
        .filter(|e| e.ancestor_id == id && e.depth > 0)
        .collect();
    rows.sort_by(|a, b| a.depth.cmp(&b.depth).then(a.descendant_id.cmp(&b.descendant_id)));
    rows.into_iter().map(|e| e.descendant_id).collect()
}

pub fn is_ancestor_of(
    edges: &[HierarchyEdge],
    ancestor: DepartmentId,
    descendant: DepartmentId,
) -> bool {
    edges
        .iter()
        .any(|e| e.ancestor_id == ancestor && e.descendant_id == descendant && e.depth > 0)
}
