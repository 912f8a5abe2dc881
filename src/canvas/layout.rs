//! Horizontal layered auto-layout for the editor.
//!
//! The layout runs over the non-widget subgraph, optionally restricted to
//! a scope: the whole canvas, the connected component around seed nodes,
//! or an exact node set. Placement is deterministic: neighbours and the
//! ready queue are ordered by the `(y, x, id)` of the nodes' *current*
//! positions. The finished layout is translated so its bounding
//! top-left matches the selected set's original bounding top-left, which
//! keeps the viewport from jumping on partial re-layouts.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Edge, Node, Position};

/// Horizontal gap between layers.
pub const H_SPACING: i64 = 560;
/// Vertical gap between rows within a layer.
pub const V_SPACING: i64 = 260;

/// Which nodes a layout request applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutScope {
    #[default]
    Full,
    ConnectedComponent,
    ExactSet,
}

/// An auto-layout request as carried on a canvas update.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    /// Only `"horizontal"` is recognised.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub scope: LayoutScope,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

impl Default for LayoutRequest {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            scope: LayoutScope::Full,
            node_ids: Vec::new(),
        }
    }
}

fn default_algorithm() -> String {
    "horizontal".to_string()
}

/// Errors raised by layout requests.
#[derive(Debug, Error, Diagnostic)]
pub enum LayoutError {
    #[error("unknown layout algorithm: {algorithm}")]
    #[diagnostic(code(loomwork::layout::algorithm))]
    UnknownAlgorithm { algorithm: String },

    #[error("unknown node id in layout scope: {node_id}")]
    #[diagnostic(code(loomwork::layout::unknown_node))]
    UnknownNode { node_id: String },

    #[error("exact-set layout requires a non-empty node list")]
    #[diagnostic(code(loomwork::layout::empty_set))]
    EmptySet,

    #[error("layout scope contains a cycle")]
    #[diagnostic(code(loomwork::layout::cycle))]
    Cycle,
}

/// Apply a layout request in place. Nodes outside scope are never moved.
pub fn auto_layout(
    nodes: &mut [Node],
    edges: &[Edge],
    request: &LayoutRequest,
) -> Result<(), LayoutError> {
    if request.algorithm != "horizontal" {
        return Err(LayoutError::UnknownAlgorithm {
            algorithm: request.algorithm.clone(),
        });
    }

    let selected = resolve_scope(nodes, edges, request)?;
    if selected.is_empty() {
        return Ok(());
    }

    let positions: FxHashMap<&str, Position> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.position))
        .collect();
    let tie_break = |id: &str| {
        let p = positions.get(id).copied().unwrap_or_default();
        (p.y, p.x, id.to_string())
    };

    // Kahn's over the selected subgraph, deterministic ready-queue order.
    let in_scope = |id: &str| selected.contains(id);
    let mut indegree: FxHashMap<&str, usize> = selected.iter().map(|id| (*id, 0)).collect();
    let mut outgoing: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for edge in edges {
        if in_scope(&edge.source_id) && in_scope(&edge.target_id) {
            if let Some(d) = indegree.get_mut(edge.target_id.as_str()) {
                *d += 1;
            }
            outgoing
                .entry(edge.source_id.as_str())
                .or_default()
                .push(edge.target_id.as_str());
        }
    }
    for targets in outgoing.values_mut() {
        targets.sort_by_key(|id| tie_break(id));
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_by_key(|id| tie_break(id));

    let mut layer: FxHashMap<&str, usize> = FxHashMap::default();
    let mut order = Vec::with_capacity(selected.len());
    while let Some(id) = ready.first().copied() {
        ready.remove(0);
        order.push(id);
        let this_layer = layer.get(id).copied().unwrap_or(0);
        for target in outgoing.get(id).cloned().unwrap_or_default() {
            let entry = layer.entry(target).or_insert(0);
            *entry = (*entry).max(this_layer + 1);
            let Some(d) = indegree.get_mut(target) else {
                continue;
            };
            *d -= 1;
            if *d == 0 {
                let pos = ready
                    .binary_search_by_key(&tie_break(target), |id| tie_break(id))
                    .unwrap_or_else(|i| i);
                ready.insert(pos, target);
            }
        }
    }
    if order.len() != selected.len() {
        return Err(LayoutError::Cycle);
    }

    // Rows: nodes within a layer sorted by the same tie-break.
    let mut by_layer: FxHashMap<usize, Vec<&str>> = FxHashMap::default();
    for id in &order {
        by_layer
            .entry(layer.get(id).copied().unwrap_or(0))
            .or_default()
            .push(id);
    }
    let mut placed: FxHashMap<String, Position> = FxHashMap::default();
    for (l, ids) in &mut by_layer {
        ids.sort_by_key(|id| tie_break(id));
        for (row, id) in ids.iter().enumerate() {
            placed.insert(
                id.to_string(),
                Position::new(*l as i64 * H_SPACING, row as i64 * V_SPACING),
            );
        }
    }

    // Anchor preservation: translate so the new bounding top-left matches
    // the selected set's original bounding top-left.
    let original_min = bounding_top_left(selected.iter().map(|id| positions[id]));
    let new_min = bounding_top_left(placed.values().copied());
    let dx = original_min.x - new_min.x;
    let dy = original_min.y - new_min.y;

    for node in nodes.iter_mut() {
        if let Some(p) = placed.get(&node.id) {
            node.position = Position::new(p.x + dx, p.y + dy);
        }
    }

    Ok(())
}

fn bounding_top_left(positions: impl Iterator<Item = Position>) -> Position {
    let mut min = Position::new(i64::MAX, i64::MAX);
    for p in positions {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
    }
    min
}

fn resolve_scope<'a>(
    nodes: &'a [Node],
    edges: &'a [Edge],
    request: &LayoutRequest,
) -> Result<FxHashSet<&'a str>, LayoutError> {
    let layoutable: FxHashSet<&str> = nodes
        .iter()
        .filter(|n| !n.is_widget())
        .map(|n| n.id.as_str())
        .collect();

    let check_known = |ids: &[String]| -> Result<(), LayoutError> {
        for id in ids {
            if !layoutable.contains(id.as_str()) {
                return Err(LayoutError::UnknownNode {
                    node_id: id.clone(),
                });
            }
        }
        Ok(())
    };

    match request.scope {
        LayoutScope::Full => Ok(layoutable),
        LayoutScope::ExactSet => {
            if request.node_ids.is_empty() {
                return Err(LayoutError::EmptySet);
            }
            check_known(&request.node_ids)?;
            Ok(request
                .node_ids
                .iter()
                .map(String::as_str)
                .filter_map(|id| layoutable.get(id).copied())
                .collect())
        }
        LayoutScope::ConnectedComponent => {
            check_known(&request.node_ids)?;
            // Undirected traversal from the seeds.
            let mut adjacency: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
            for edge in edges {
                if layoutable.contains(edge.source_id.as_str())
                    && layoutable.contains(edge.target_id.as_str())
                {
                    adjacency
                        .entry(edge.source_id.as_str())
                        .or_default()
                        .push(edge.target_id.as_str());
                    adjacency
                        .entry(edge.target_id.as_str())
                        .or_default()
                        .push(edge.source_id.as_str());
                }
            }
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            let mut stack: Vec<&str> = request
                .node_ids
                .iter()
                .filter_map(|id| layoutable.get(id.as_str()).copied())
                .collect();
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                for next in adjacency.get(id).into_iter().flatten() {
                    if !seen.contains(next) {
                        stack.push(next);
                    }
                }
            }
            Ok(seen)
        }
    }
}
