mod common;

use common::*;
use loomwork::canvas::{Edge, UpdateError};
use loomwork::engine::EngineError;
use loomwork::store::{EngineStore, NewExecution, StoreError};
use loomwork::types::NodeState;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_create_then_describe_canvas() {
    let (engine, _store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![noop_node("a"), noop_node("b")],
        vec![Edge::new("a", "b")],
    );

    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();

    let row = engine.describe_canvas(canvas_id).await.unwrap();
    assert_eq!(row.canvas.nodes.len(), 2);
    assert_eq!(row.canvas.edges.len(), 1);
}

#[tokio::test]
async fn test_widget_edge_rejected_and_nothing_persisted() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![noop_node("a"), widget_node("w")],
        vec![Edge::new("a", "w")],
    );

    let err = engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("widget nodes cannot be used as target nodes"),
        "unexpected message: {err}"
    );

    assert!(matches!(
        store.get_canvas(canvas_id).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(store.list_nodes(canvas_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cyclic_canvas_rejected() {
    let (engine, _store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![noop_node("a"), noop_node("b"), noop_node("c")],
        vec![
            Edge::new("a", "b"),
            Edge::new("b", "c"),
            Edge::new("c", "a"),
        ],
    );

    let err = engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Update(UpdateError::Cycle)
    ));
}

#[tokio::test]
async fn test_unknown_component_ref_rejected() {
    let (engine, _store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![component_node("a", "does-not-exist")],
        vec![],
    );

    let err = engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Update(UpdateError::UnknownRef { .. })
    ));
}

#[tokio::test]
async fn test_template_canvas_is_read_only() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let mut template = canvas_with(canvas_id, org, vec![noop_node("a")], vec![]);
    template.is_template = true;
    store.upsert_canvas(&template).await.unwrap();

    let proposed = canvas_with(canvas_id, org, vec![noop_node("a")], vec![]);
    let err = engine
        .update_canvas(org, canvas_id, proposed, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Update(UpdateError::Template { .. })
    ));
}

#[tokio::test]
async fn test_id_remap_preserves_tombstones_and_rewrites_edges() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    // Round 1: canvas with node X and a neighbour.
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![noop_node("X"), noop_node("sink")],
        vec![Edge::new("X", "sink")],
    );
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();

    // A historical execution on X keeps a foreign key to the node row.
    let execution = store
        .create_execution(NewExecution {
            workflow_id: canvas_id,
            node_id: "X".into(),
            root_event_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            previous_execution_id: None,
            parent_execution_id: None,
            configuration: serde_json::Map::new(),
            metadata: json!({}),
        })
        .await
        .unwrap();

    // Round 2: X removed. Soft-deleted, not gone.
    let without_x = canvas_with(canvas_id, org, vec![noop_node("sink")], vec![]);
    engine
        .update_canvas(org, canvas_id, without_x, None)
        .await
        .unwrap();
    assert!(matches!(
        store.get_node(canvas_id, "X").await,
        Err(StoreError::NotFound { .. })
    ));
    let tombstone = store.get_node_unscoped(canvas_id, "X").await.unwrap();
    assert!(tombstone.deleted_at.is_some());

    // Round 3: the user re-creates X under the same familiar ID.
    let re_proposed = canvas_with(
        canvas_id,
        org,
        vec![noop_node("X"), noop_node("sink")],
        vec![Edge::new("X", "sink")],
    );
    let outcome = engine
        .update_canvas(org, canvas_id, re_proposed, None)
        .await
        .unwrap();

    let fresh = outcome.remapped.get("X").expect("X should be remapped");
    assert_ne!(fresh, "X");
    assert!(fresh.starts_with("X-"));
    assert!(
        outcome
            .canvas
            .edges
            .iter()
            .any(|e| e.source_id == *fresh && e.target_id == "sink"),
        "edges must be rewritten to the fresh ID"
    );

    // The fresh node is live, the tombstone is still reachable unscoped,
    // and the historical execution still resolves its parent node.
    assert!(store.get_node(canvas_id, fresh).await.is_ok());
    assert!(store.get_node_unscoped(canvas_id, "X").await.is_ok());
    let historical = store.get_execution(execution.id).await.unwrap();
    assert_eq!(historical.node_id, "X");
    assert!(
        store
            .get_node_unscoped(canvas_id, &historical.node_id)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_errored_node_resets_to_ready_on_next_good_update() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    // First update: setup fails, node lands in error state.
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![component_node("n", "flaky-setup")],
        vec![],
    );
    engine
        .update_canvas(org, canvas_id, canvas.clone(), None)
        .await
        .unwrap();
    let node = store.get_node(canvas_id, "n").await.unwrap();
    assert_eq!(node.state, NodeState::Error);
    assert!(node.state_reason.as_deref().unwrap_or_default().contains("credentials"));

    // Second update: setup passes, error state resets.
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    let node = store.get_node(canvas_id, "n").await.unwrap();
    assert_eq!(node.state, NodeState::Ready);
    assert_eq!(node.state_reason, None);
}

#[tokio::test]
async fn test_soft_deleted_ids_stay_reserved_for_the_minter() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(canvas_id, org, vec![noop_node("solo")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    engine
        .update_canvas(org, canvas_id, canvas_with(canvas_id, org, vec![], vec![]), None)
        .await
        .unwrap();

    let reserved = store.reserved_node_ids(canvas_id).await.unwrap();
    assert!(reserved.contains(&"solo".to_string()));
}

/// A canvas update must not disturb a node that is mid-flight.
#[tokio::test]
async fn test_processing_state_survives_edits() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(canvas_id, org, vec![noop_node("a")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas.clone(), None)
        .await
        .unwrap();
    store
        .set_node_state(canvas_id, "a", NodeState::Processing, None)
        .await
        .unwrap();

    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    let node = store.get_node(canvas_id, "a").await.unwrap();
    assert_eq!(node.state, NodeState::Processing);
}
