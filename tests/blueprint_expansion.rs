mod common;

use common::*;
use loomwork::store::EngineStore;
use loomwork::types::{ExecutionResult, ExecutionState, NodeType};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_blueprint_expands_into_namespaced_children() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(canvas_id, org, vec![blueprint_node("X", "pair")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();

    let mut ids: Vec<String> = store
        .list_nodes(canvas_id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.node_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["X", "X:a", "X:b"]);

    let sentinel = store.get_node(canvas_id, "X").await.unwrap();
    assert_eq!(sentinel.node_type, NodeType::Blueprint);
    assert_eq!(sentinel.parent_node_id, None);

    for child in ["X:a", "X:b"] {
        let row = store.get_node(canvas_id, child).await.unwrap();
        assert_eq!(row.parent_node_id.as_deref(), Some("X"));
        assert_eq!(row.node_type, NodeType::Component);
    }

    // The blueprint's internal widget never becomes a persisted node.
    assert!(store.get_node_unscoped(canvas_id, "X:note").await.is_err());
}

#[tokio::test]
async fn test_blueprint_execution_chain_links_children_to_outer_execution() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(canvas_id, org, vec![blueprint_node("X", "pair")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();

    let root_event = engine
        .emit_node_event(canvas_id, "X", json!({"seed": 1}))
        .await
        .unwrap();
    engine.executor().tick().await.unwrap();

    // Outer execution finished once the terminal internal node ran.
    let outer = store.list_executions(canvas_id, "X").await.unwrap();
    assert_eq!(outer.len(), 1);
    assert_eq!(outer[0].state, ExecutionState::Finished);
    assert_eq!(outer[0].result, Some(ExecutionResult::Passed));

    // The first child is linked directly; the second inherits the parent
    // through the event chain.
    let child_a = store.list_executions(canvas_id, "X:a").await.unwrap();
    assert_eq!(child_a.len(), 1);
    assert_eq!(child_a[0].parent_execution_id, Some(outer[0].id));

    let child_b = store.list_executions(canvas_id, "X:b").await.unwrap();
    assert_eq!(child_b.len(), 1);
    assert_eq!(child_b[0].parent_execution_id, Some(outer[0].id));

    // Everything shares the root event.
    for execution in child_a.iter().chain(child_b.iter()) {
        assert_eq!(execution.root_event_id, root_event.root_event_id);
        assert_eq!(execution.state, ExecutionState::Finished);
    }

    let children = engine.list_child_executions(outer[0].id).await.unwrap();
    assert_eq!(children.len(), 2);
}

/// Blueprints with more than one declared output channel are only
/// supported by the default-channel convention so far.
#[tokio::test]
#[ignore = "multi-channel blueprint output propagation is undecided"]
async fn test_blueprint_multi_channel_outputs() {}
