//! The canvas updater: turns a proposed canvas into persisted state.
//!
//! The pipeline (in order): authorize & load, parse & validate (unknown
//! refs, widget-endpoint edges, cycles), optional auto-layout, ID remap
//! against soft-deleted rows, blueprint expansion, node upsert with the
//! state-transition table, per-node setup, canvas persist, soft-delete of
//! removed nodes, and a fire-and-forget `canvas.updated` notice.
//!
//! Failure semantics are deliberately split: validation failures (the
//! first three stages) fail the whole update and persist nothing, while
//! upsert/setup failures are *persisted* as node `error` state so the
//! editor can surface them and the user can fix nodes incrementally.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::blueprint::{ExpandError, ExpandedNode, expand_blueprints};
use super::layout::{LayoutError, LayoutRequest, auto_layout};
use super::model::{Canvas, generate_unique_node_id};
use crate::execution::context::ContextBuilder;
use crate::notify::{CANVAS_UPDATED, NoticeHub};
use crate::registry::Registry;
use crate::store::{CanvasNodeRow, EngineStore, StoreError};
use crate::types::{NodeState, NodeType};

/// Errors that fail a canvas update outright (stages 1–3).
#[derive(Debug, Error, Diagnostic)]
pub enum UpdateError {
    #[error("canvas {canvas_id} is a template and cannot be updated")]
    #[diagnostic(code(loomwork::update::template))]
    Template { canvas_id: Uuid },

    #[error("canvas {canvas_id} does not belong to the calling organization")]
    #[diagnostic(code(loomwork::update::forbidden))]
    Forbidden { canvas_id: Uuid },

    #[error("unknown {kind}: {name} (node {node_id})")]
    #[diagnostic(code(loomwork::update::unknown_ref))]
    UnknownRef {
        kind: &'static str,
        name: String,
        node_id: String,
    },

    #[error("node {node_id}: declared type {declared} does not match its reference")]
    #[diagnostic(code(loomwork::update::ref_mismatch))]
    RefMismatch { node_id: String, declared: NodeType },

    #[error("edge references unknown node: {node_id}")]
    #[diagnostic(code(loomwork::update::unknown_edge_endpoint))]
    UnknownEdgeEndpoint { node_id: String },

    #[error("widget nodes cannot be used as {role} nodes")]
    #[diagnostic(code(loomwork::update::widget_edge))]
    WidgetEdge { role: &'static str, node_id: String },

    #[error("canvas contains a cycle")]
    #[diagnostic(code(loomwork::update::cycle))]
    Cycle,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Expand(#[from] ExpandError),

    #[error(transparent)]
    #[diagnostic(code(loomwork::update::store))]
    Store(#[from] StoreError),
}

/// Result of a successful update.
#[derive(Clone, Debug)]
pub struct UpdateOutcome {
    /// The persisted canvas document (IDs possibly remapped).
    pub canvas: Canvas,
    /// Old ID → fresh ID for nodes that collided with tombstones.
    pub remapped: FxHashMap<String, String>,
}

/// Applies proposed canvases against the store.
pub struct CanvasUpdater {
    store: Arc<dyn EngineStore>,
    registry: Arc<Registry>,
    contexts: ContextBuilder,
    hub: NoticeHub,
}

impl CanvasUpdater {
    #[must_use]
    pub fn new(
        store: Arc<dyn EngineStore>,
        registry: Arc<Registry>,
        contexts: ContextBuilder,
        hub: NoticeHub,
    ) -> Self {
        Self {
            store,
            registry,
            contexts,
            hub,
        }
    }

    /// Create or update a canvas.
    #[instrument(skip(self, proposed, layout), fields(canvas = %canvas_id), err)]
    pub async fn update_canvas(
        &self,
        organization_id: Uuid,
        canvas_id: Uuid,
        mut proposed: Canvas,
        layout: Option<&LayoutRequest>,
    ) -> Result<UpdateOutcome, UpdateError> {
        proposed.id = canvas_id;
        proposed.organization_id = organization_id;

        // 1. Authorize & load. An absent canvas is a create.
        match self.store.get_canvas(canvas_id).await {
            Ok(row) => {
                if row.canvas.is_template {
                    return Err(UpdateError::Template { canvas_id });
                }
                if row.canvas.organization_id != organization_id {
                    return Err(UpdateError::Forbidden { canvas_id });
                }
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        // 2. Parse & validate.
        self.validate_refs(&proposed)?;
        validate_edges(&proposed)?;
        validate_acyclic(&proposed)?;

        // 3. Optional auto-layout.
        if let Some(request) = layout {
            auto_layout(&mut proposed.nodes, &proposed.edges, request)?;
        }

        // 4. Remap IDs that collide with soft-deleted rows.
        let remapped = self.remap_node_ids(canvas_id, &mut proposed).await?;

        // 5. Expand blueprints into namespaced children.
        let resolve = |name: &str| self.registry.blueprint(name).ok();
        let expansion = expand_blueprints(&proposed.nodes, &proposed.edges, &resolve)?;

        // 6–7. Upsert and set up each expanded node; failures are stored,
        // not raised.
        let live_before: FxHashSet<String> = self
            .store
            .list_nodes(canvas_id)
            .await?
            .into_iter()
            .map(|n| n.node_id)
            .collect();
        for expanded in &expansion.nodes {
            self.upsert_and_setup(organization_id, canvas_id, expanded)
                .await;
        }

        // 8. Persist the canvas document itself.
        self.store.upsert_canvas(&proposed).await?;

        // 9. Soft-delete nodes present before and absent now.
        let expanded_ids: FxHashSet<&str> = expansion
            .nodes
            .iter()
            .map(|n| n.node.id.as_str())
            .collect();
        for node_id in &live_before {
            if !expanded_ids.contains(node_id.as_str()) {
                self.cleanup_and_delete(organization_id, canvas_id, node_id)
                    .await;
            }
        }

        // 10. Publish.
        self.hub.publish(
            CANVAS_UPDATED,
            json!({ "canvasId": canvas_id, "organizationId": organization_id }),
        );

        Ok(UpdateOutcome {
            canvas: proposed,
            remapped,
        })
    }

    fn validate_refs(&self, proposed: &Canvas) -> Result<(), UpdateError> {
        for node in &proposed.nodes {
            if node.node_ref.node_type() != node.node_type {
                return Err(UpdateError::RefMismatch {
                    node_id: node.id.clone(),
                    declared: node.node_type,
                });
            }
            let name = node.node_ref.name();
            let known = match node.node_type {
                NodeType::Component => self.registry.component(name).is_ok(),
                NodeType::Trigger => self.registry.trigger(name).is_ok(),
                NodeType::Blueprint => self.registry.has_blueprint(name),
                NodeType::Widget => true,
            };
            if !known {
                return Err(UpdateError::UnknownRef {
                    kind: node.node_type.encode(),
                    name: name.to_string(),
                    node_id: node.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Proposed IDs that collide with a soft-deleted row get a fresh ID;
    /// edges referencing the old ID are rewritten. This preserves
    /// historical executions' foreign keys while letting the user
    /// re-create a node under a familiar ID.
    async fn remap_node_ids(
        &self,
        canvas_id: Uuid,
        proposed: &mut Canvas,
    ) -> Result<FxHashMap<String, String>, UpdateError> {
        let reserved_all: FxHashSet<String> = self
            .store
            .reserved_node_ids(canvas_id)
            .await?
            .into_iter()
            .collect();
        let live: FxHashSet<String> = self
            .store
            .list_nodes(canvas_id)
            .await?
            .into_iter()
            .map(|n| n.node_id)
            .collect();

        let mut reserved: FxHashSet<String> = reserved_all.clone();
        reserved.extend(proposed.nodes.iter().map(|n| n.id.clone()));

        let mut remapped = FxHashMap::default();
        for node in &mut proposed.nodes {
            let tombstoned = reserved_all.contains(&node.id) && !live.contains(&node.id);
            if tombstoned {
                let fresh = generate_unique_node_id(&node.id, &reserved);
                reserved.insert(fresh.clone());
                remapped.insert(node.id.clone(), fresh.clone());
                node.id = fresh;
            }
        }
        for edge in &mut proposed.edges {
            if let Some(fresh) = remapped.get(&edge.source_id) {
                edge.source_id = fresh.clone();
            }
            if let Some(fresh) = remapped.get(&edge.target_id) {
                edge.target_id = fresh.clone();
            }
        }
        Ok(remapped)
    }

    /// Stages 6–7 for one expanded node. Never raises: failures end up as
    /// node `error` state (bubbled to the parent blueprint node, if any).
    async fn upsert_and_setup(
        &self,
        organization_id: Uuid,
        canvas_id: Uuid,
        expanded: &ExpandedNode,
    ) {
        let node = &expanded.node;
        let existing = match self.store.get_node(canvas_id, &node.id).await {
            Ok(row) => Some(row),
            Err(StoreError::NotFound { .. }) => None,
            Err(error) => {
                tracing::warn!(node = %node.id, %error, "node lookup failed; skipping upsert");
                return;
            }
        };

        let (state, state_reason) = match (&node.error_message, existing.as_ref()) {
            (Some(message), _) => (NodeState::Error, Some(message.clone())),
            (None, Some(prior)) if prior.state == NodeState::Error => (NodeState::Ready, None),
            (None, Some(prior)) => (prior.state, prior.state_reason.clone()),
            (None, None) => (NodeState::Ready, None),
        };

        let row = CanvasNodeRow {
            workflow_id: canvas_id,
            node_id: node.id.clone(),
            parent_node_id: expanded.parent_node_id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
            state,
            state_reason,
            node_ref: node.node_ref.clone(),
            configuration: node.configuration.clone(),
            position: node.position,
            is_collapsed: node.is_collapsed,
            metadata: existing
                .as_ref()
                .map(|e| e.metadata.clone())
                .unwrap_or_else(|| json!({})),
            app_installation_id: node.integration_id.clone(),
            webhook_id: existing.as_ref().and_then(|e| e.webhook_id.clone()),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            deleted_at: None,
        };
        if let Err(error) = self.store.upsert_node(&row).await {
            tracing::warn!(node = %node.id, %error, "node upsert failed");
            return;
        }

        if state != NodeState::Ready {
            return;
        }
        if let Err(message) = self.setup_node(organization_id, &row).await {
            if let Err(error) = self
                .store
                .set_node_state(canvas_id, &row.node_id, NodeState::Error, Some(message.clone()))
                .await
            {
                tracing::warn!(node = %row.node_id, %error, "storing setup failure failed");
            }
            // Bubble the message up onto the embedding blueprint node so
            // the editor can surface it.
            if let Some(parent) = &row.parent_node_id {
                if let Err(error) = self
                    .store
                    .set_node_state(canvas_id, parent, NodeState::Error, Some(message))
                    .await
                {
                    tracing::warn!(node = %parent, %error, "bubbling setup failure failed");
                }
            }
        }
    }

    async fn setup_node(
        &self,
        organization_id: Uuid,
        row: &CanvasNodeRow,
    ) -> Result<(), String> {
        let mut ctx = self.contexts.setup_context(organization_id, row.clone());
        let result = match row.node_type {
            NodeType::Component => match self.registry.component(row.node_ref.name()) {
                Ok(component) => component.setup(&mut ctx).await,
                Err(e) => return Err(e.to_string()),
            },
            NodeType::Trigger => match self.registry.trigger(row.node_ref.name()) {
                Ok(trigger) => trigger.setup(&mut ctx).await,
                Err(e) => return Err(e.to_string()),
            },
            // Blueprint sentinels and widgets have no implementation.
            NodeType::Blueprint | NodeType::Widget => Ok(()),
        };
        result.map_err(|e| e.to_string())
    }

    /// Best-effort cleanup, then soft-delete.
    async fn cleanup_and_delete(&self, organization_id: Uuid, canvas_id: Uuid, node_id: &str) {
        if let Ok(row) = self.store.get_node(canvas_id, node_id).await {
            let mut ctx = self.contexts.setup_context(organization_id, row.clone());
            let result = match row.node_type {
                NodeType::Component => match self.registry.component(row.node_ref.name()) {
                    Ok(component) => component.cleanup(&mut ctx).await,
                    Err(_) => Ok(()),
                },
                NodeType::Trigger => match self.registry.trigger(row.node_ref.name()) {
                    Ok(trigger) => trigger.cleanup(&mut ctx).await,
                    Err(_) => Ok(()),
                },
                _ => Ok(()),
            };
            if let Err(error) = result {
                tracing::warn!(node = %node_id, %error, "node cleanup failed");
            }
        }
        if let Err(error) = self.store.soft_delete_node(canvas_id, node_id).await {
            tracing::warn!(node = %node_id, %error, "soft delete failed");
        }
    }
}

fn validate_edges(proposed: &Canvas) -> Result<(), UpdateError> {
    for edge in &proposed.edges {
        let source = proposed
            .node(&edge.source_id)
            .ok_or_else(|| UpdateError::UnknownEdgeEndpoint {
                node_id: edge.source_id.clone(),
            })?;
        let target = proposed
            .node(&edge.target_id)
            .ok_or_else(|| UpdateError::UnknownEdgeEndpoint {
                node_id: edge.target_id.clone(),
            })?;
        if source.is_widget() {
            return Err(UpdateError::WidgetEdge {
                role: "source",
                node_id: source.id.clone(),
            });
        }
        if target.is_widget() {
            return Err(UpdateError::WidgetEdge {
                role: "target",
                node_id: target.id.clone(),
            });
        }
    }
    Ok(())
}

/// Kahn's algorithm over the proposed graph; reports a cycle iff one
/// exists.
fn validate_acyclic(proposed: &Canvas) -> Result<(), UpdateError> {
    let ids: FxHashSet<&str> = proposed.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut indegree: FxHashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut outgoing: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for edge in &proposed.edges {
        if ids.contains(edge.source_id.as_str()) && ids.contains(edge.target_id.as_str()) {
            if let Some(d) = indegree.get_mut(edge.target_id.as_str()) {
                *d += 1;
            }
            outgoing
                .entry(edge.source_id.as_str())
                .or_default()
                .push(edge.target_id.as_str());
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;
    while let Some(id) = ready.pop() {
        visited += 1;
        for target in outgoing.get(id).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(target) {
                *d -= 1;
                if *d == 0 {
                    ready.push(target);
                }
            }
        }
    }
    if visited != ids.len() {
        return Err(UpdateError::Cycle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::{Edge, Node, NodeRef};

    fn canvas_with(nodes: Vec<Node>, edges: Vec<Edge>) -> Canvas {
        let mut canvas = Canvas::new(Uuid::new_v4(), Uuid::new_v4(), "test");
        canvas.nodes = nodes;
        canvas.edges = edges;
        canvas
    }

    fn component_node(id: &str) -> Node {
        Node::new(
            id,
            NodeRef::Component {
                component: "noop".into(),
            },
        )
    }

    #[test]
    fn kahn_accepts_a_dag() {
        let canvas = canvas_with(
            vec![component_node("a"), component_node("b"), component_node("c")],
            vec![Edge::new("a", "b"), Edge::new("b", "c"), Edge::new("a", "c")],
        );
        assert!(validate_acyclic(&canvas).is_ok());
    }

    #[test]
    fn kahn_rejects_a_cycle() {
        let canvas = canvas_with(
            vec![component_node("a"), component_node("b")],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
        );
        assert!(matches!(validate_acyclic(&canvas), Err(UpdateError::Cycle)));
    }

    #[test]
    fn widget_edges_are_rejected_with_role_in_message() {
        let widget = Node::new(
            "w",
            NodeRef::Widget {
                widget: "note".into(),
            },
        );
        let canvas = canvas_with(
            vec![component_node("a"), widget],
            vec![Edge::new("w", "a")],
        );
        let err = validate_edges(&canvas).unwrap_err();
        assert_eq!(
            err.to_string(),
            "widget nodes cannot be used as source nodes"
        );
    }
}
