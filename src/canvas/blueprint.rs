//! Blueprint definitions and their expansion into namespaced child nodes.
//!
//! A blueprint is a reusable sub-graph embedded in a canvas as a single
//! node. Expansion flattens it: every internal node ID is prefixed with
//! `"<blueprintNodeId>:"`, gets `parent_node_id` set, and widget internals
//! are dropped. The blueprint node itself stays in the expanded set as a
//! non-executable sentinel: it is what the executor dispatches on, and it
//! carries error messages bubbled up from child setup failures.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Edge, Node};
use crate::schema::Field;
use crate::types::{DEFAULT_CHANNEL, NodeType};

/// A reusable sub-graph with a declared outer surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Channels the blueprint surfaces to the outer canvas.
    #[serde(default)]
    pub output_channels: Vec<String>,
    /// Configuration schema shown on the embedding node.
    #[serde(default)]
    pub configuration: Vec<Field>,
}

impl Blueprint {
    /// The internal entry node: the first executable node with no
    /// incoming internal edge.
    #[must_use]
    pub fn root_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.node_type.is_executable())
            .find(|n| !self.edges.iter().any(|e| e.target_id == n.id))
    }

    /// Internal nodes with no outgoing internal edge; their emissions
    /// surface to the outer canvas.
    fn terminal_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.node_type.is_executable())
            .filter(|n| !self.edges.iter().any(|e| e.source_id == n.id))
            .collect()
    }
}

/// A node in the expanded (persistable) set.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedNode {
    pub node: Node,
    /// Set for blueprint internals: the embedding blueprint node's ID.
    pub parent_node_id: Option<String>,
}

/// Errors raised during blueprint expansion.
#[derive(Debug, Error, Diagnostic)]
pub enum ExpandError {
    #[error("unknown blueprint: {name}")]
    #[diagnostic(code(loomwork::blueprint::unknown))]
    Unknown { name: String },

    #[error("blueprint {name} has no executable entry node")]
    #[diagnostic(
        code(loomwork::blueprint::empty),
        help("A blueprint needs at least one component or trigger node without incoming edges.")
    )]
    NoEntry { name: String },

    #[error("blueprint {name} embeds itself (directly or via another blueprint)")]
    #[diagnostic(code(loomwork::blueprint::cycle))]
    Cycle { name: String },
}

/// Result of flattening a canvas's blueprint nodes.
#[derive(Clone, Debug, Default)]
pub struct Expansion {
    pub nodes: Vec<ExpandedNode>,
    pub edges: Vec<Edge>,
}

/// Flatten every blueprint node of a canvas into namespaced children.
///
/// Widget nodes (outer and internal) are dropped from the expanded set.
/// Outbound edges of a blueprint node are rewritten so that each terminal
/// internal node's default-channel emissions surface to the outer targets;
/// inbound edges keep pointing at the blueprint sentinel, which is how the
/// executor knows to materialise the first child execution.
pub fn expand_blueprints(
    nodes: &[Node],
    edges: &[Edge],
    resolve: &dyn Fn(&str) -> Option<Blueprint>,
) -> Result<Expansion, ExpandError> {
    let mut out = Expansion::default();
    let mut stack = Vec::new();

    for node in nodes {
        if node.is_widget() {
            continue;
        }
        expand_node(node, None, resolve, &mut out, &mut stack)?;
    }

    // Outer edges carry over, except that a blueprint's outbound edges are
    // re-sourced onto its terminal internal nodes.
    for edge in edges {
        let Some(source) = nodes.iter().find(|n| n.id == edge.source_id) else {
            out.edges.push(edge.clone());
            continue;
        };
        if source.node_type != NodeType::Blueprint {
            out.edges.push(edge.clone());
            continue;
        }
        let name = source.node_ref.name();
        let blueprint = resolve(name).ok_or_else(|| ExpandError::Unknown {
            name: name.to_string(),
        })?;
        for terminal in blueprint.terminal_nodes() {
            out.edges.push(Edge {
                source_id: format!("{}:{}", source.id, terminal.id),
                target_id: edge.target_id.clone(),
                channel: DEFAULT_CHANNEL.to_string(),
            });
        }
    }

    Ok(out)
}

fn expand_node(
    node: &Node,
    parent: Option<&str>,
    resolve: &dyn Fn(&str) -> Option<Blueprint>,
    out: &mut Expansion,
    stack: &mut Vec<String>,
) -> Result<(), ExpandError> {
    out.nodes.push(ExpandedNode {
        node: node.clone(),
        parent_node_id: parent.map(str::to_string),
    });

    if node.node_type != NodeType::Blueprint {
        return Ok(());
    }

    let name = node.node_ref.name().to_string();
    if stack.contains(&name) {
        return Err(ExpandError::Cycle { name });
    }
    let blueprint = resolve(&name).ok_or_else(|| ExpandError::Unknown { name: name.clone() })?;
    blueprint
        .root_node()
        .ok_or_else(|| ExpandError::NoEntry { name: name.clone() })?;

    stack.push(name);
    for internal in &blueprint.nodes {
        if internal.is_widget() {
            continue;
        }
        let mut child = internal.clone();
        child.id = format!("{}:{}", node.id, internal.id);
        expand_node(&child, Some(&node.id), resolve, out, stack)?;
    }
    for edge in &blueprint.edges {
        out.edges.push(Edge {
            source_id: format!("{}:{}", node.id, edge.source_id),
            target_id: format!("{}:{}", node.id, edge.target_id),
            channel: edge.channel.clone(),
        });
    }
    stack.pop();

    Ok(())
}

/// The namespaced ID of a blueprint's entry node, used by the executor to
/// materialise the first child execution.
pub fn root_child_id(blueprint_node_id: &str, blueprint: &Blueprint) -> Result<String, ExpandError> {
    let root = blueprint.root_node().ok_or_else(|| ExpandError::NoEntry {
        name: blueprint.name.clone(),
    })?;
    Ok(format!("{blueprint_node_id}:{}", root.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::NodeRef;

    fn two_step_blueprint() -> Blueprint {
        Blueprint {
            name: "enrich".into(),
            label: "Enrich".into(),
            nodes: vec![
                Node::new("a", NodeRef::Component { component: "noop".into() }),
                Node::new("b", NodeRef::Component { component: "noop".into() }),
            ],
            edges: vec![Edge::new("a", "b")],
            output_channels: vec![DEFAULT_CHANNEL.into()],
            ..Default::default()
        }
    }

    #[test]
    fn root_is_node_without_incoming_edges() {
        let bp = two_step_blueprint();
        assert_eq!(bp.root_node().unwrap().id, "a");
        assert_eq!(root_child_id("X", &bp).unwrap(), "X:a");
    }

    #[test]
    fn expansion_namespaces_and_records_parent() {
        let nodes = vec![Node::new(
            "X",
            NodeRef::Blueprint {
                blueprint: "enrich".into(),
            },
        )];
        let bp = two_step_blueprint();
        let resolve = move |name: &str| (name == "enrich").then(|| bp.clone());
        let out = expand_blueprints(&nodes, &[], &resolve).unwrap();

        let ids: Vec<_> = out.nodes.iter().map(|n| n.node.id.as_str()).collect();
        assert_eq!(ids, vec!["X", "X:a", "X:b"]);
        assert_eq!(out.nodes[1].parent_node_id.as_deref(), Some("X"));
        assert_eq!(out.nodes[2].parent_node_id.as_deref(), Some("X"));
        assert!(out.edges.iter().any(|e| e.source_id == "X:a" && e.target_id == "X:b"));
    }

    #[test]
    fn self_embedding_blueprint_is_a_cycle() {
        let bp = Blueprint {
            name: "loop".into(),
            label: "Loop".into(),
            nodes: vec![Node::new(
                "inner",
                NodeRef::Blueprint {
                    blueprint: "loop".into(),
                },
            )],
            ..Default::default()
        };
        let nodes = vec![Node::new(
            "X",
            NodeRef::Blueprint {
                blueprint: "loop".into(),
            },
        )];
        let resolve = move |name: &str| (name == "loop").then(|| bp.clone());
        // The outer node itself resolves, but recursing into it revisits
        // the same blueprint name.
        let err = expand_blueprints(&nodes, &[], &resolve);
        assert!(matches!(
            err,
            Err(ExpandError::Cycle { .. }) | Err(ExpandError::NoEntry { .. })
        ));
    }
}
