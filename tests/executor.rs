mod common;

use common::*;
use loomwork::canvas::Edge;
use loomwork::store::{EngineStore, ExecutionClaim, MemoryStore, NewExecution, StoreError};
use loomwork::types::{DEFAULT_CHANNEL, ExecutionResult, ExecutionState};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn pending_execution(workflow_id: Uuid, node_id: &str) -> NewExecution {
    NewExecution {
        workflow_id,
        node_id: node_id.into(),
        root_event_id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        previous_execution_id: None,
        parent_execution_id: None,
        configuration: serde_json::Map::new(),
        metadata: json!({}),
    }
}

#[tokio::test]
async fn test_single_claim_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let workflow_id = Uuid::new_v4();
    let execution = store
        .create_execution(pending_execution(workflow_id, "n"))
        .await
        .unwrap();

    const WORKERS: usize = 16;
    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let store = Arc::clone(&store);
        let id = execution.id;
        handles.push(tokio::spawn(async move {
            match store.lock_pending_execution(id).await {
                Ok(mut claim) => {
                    claim.mark_started().await.unwrap();
                    claim
                        .finish(ExecutionResult::Passed, None)
                        .await
                        .unwrap();
                    claim.commit().await.unwrap();
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0;
    let mut locked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => winners += 1,
            Err(StoreError::RecordLocked) => locked += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(locked, WORKERS - 1);

    let row = store.get_execution(execution.id).await.unwrap();
    assert_ne!(row.state, ExecutionState::Pending);
    assert_eq!(row.result, Some(ExecutionResult::Passed));
}

#[tokio::test]
async fn test_abandoned_claim_leaves_execution_pending() {
    let store = Arc::new(MemoryStore::new());
    let workflow_id = Uuid::new_v4();
    let execution = store
        .create_execution(pending_execution(workflow_id, "n"))
        .await
        .unwrap();

    {
        let mut claim = store.lock_pending_execution(execution.id).await.unwrap();
        claim.mark_started().await.unwrap();
        // Dropped without commit: a crashed worker.
    }

    let row = store.get_execution(execution.id).await.unwrap();
    assert_eq!(row.state, ExecutionState::Pending);

    // The next tick can claim it again.
    let claim = store.lock_pending_execution(execution.id).await.unwrap();
    drop(claim);
}

#[tokio::test]
async fn test_scheduler_fan_out_end_to_end() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(
        canvas_id,
        org,
        vec![noop_node("A"), noop_node("B")],
        vec![Edge::new("A", "B")],
    );
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();

    let root = engine
        .emit_node_event(canvas_id, "A", json!({"n": 1}))
        .await
        .unwrap();
    assert_eq!(root.root_event_id, root.id);

    let report = engine.executor().tick().await.unwrap();
    assert!(report.executions_run >= 2, "report: {report:?}");

    let a_runs = store.list_executions(canvas_id, "A").await.unwrap();
    let b_runs = store.list_executions(canvas_id, "B").await.unwrap();
    assert_eq!(a_runs.len(), 1);
    assert_eq!(b_runs.len(), 1);
    let e_a = &a_runs[0];
    let e_b = &b_runs[0];

    assert_eq!(e_a.state, ExecutionState::Finished);
    assert_eq!(e_a.result, Some(ExecutionResult::Passed));
    assert_eq!(e_b.state, ExecutionState::Finished);

    // A finished (and committed) before B was even created.
    assert!(e_a.finished_at.unwrap() <= e_b.created_at);

    // B's input event is the one A emitted on the default channel, and
    // the whole chain shares one root event.
    let a_events = store.list_events(canvas_id, "A").await.unwrap();
    let emitted: Vec<_> = a_events
        .iter()
        .filter(|e| e.execution_id == Some(e_a.id))
        .collect();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].channel, DEFAULT_CHANNEL);
    assert_eq!(e_b.event_id, emitted[0].id);
    assert_eq!(e_a.root_event_id, root.id);
    assert_eq!(e_b.root_event_id, root.id);
    assert_eq!(emitted[0].data, json!({"n": 1}));

    // B's previous execution is A's (the event chain).
    assert_eq!(e_b.previous_execution_id, Some(e_a.id));

    // Queues drained.
    assert!(store.pending_queue_items(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_paused_node_holds_queue_items_until_resumed() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(canvas_id, org, vec![noop_node("a")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    engine.set_node_paused(canvas_id, "a", true).await.unwrap();
    engine
        .emit_node_event(canvas_id, "a", json!({}))
        .await
        .unwrap();

    engine.executor().tick().await.unwrap();
    assert!(store.list_executions(canvas_id, "a").await.unwrap().is_empty());
    assert_eq!(store.list_queue_items(canvas_id, "a").await.unwrap().len(), 1);

    engine.set_node_paused(canvas_id, "a", false).await.unwrap();
    engine.executor().tick().await.unwrap();
    assert_eq!(store.list_executions(canvas_id, "a").await.unwrap().len(), 1);
    assert!(store.list_queue_items(canvas_id, "a").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_component_error_finishes_execution_and_worker_succeeds() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(canvas_id, org, vec![component_node("f", "failing")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    engine
        .emit_node_event(canvas_id, "f", json!({}))
        .await
        .unwrap();

    engine.executor().tick().await.unwrap();

    let runs = store.list_executions(canvas_id, "f").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, ExecutionState::Finished);
    assert_eq!(runs[0].result, Some(ExecutionResult::Error));
    assert_eq!(runs[0].result_reason.as_deref(), Some("boom"));

    // A finished execution is never re-picked.
    let report = engine.executor().tick().await.unwrap();
    assert_eq!(report.executions_run, 0);
}

#[tokio::test]
async fn test_domain_failure_records_failed_result() {
    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    let canvas = canvas_with(
        canvas_id,
        org,
        vec![component_node("d", "domain-fail")],
        vec![],
    );
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    engine
        .emit_node_event(canvas_id, "d", json!({}))
        .await
        .unwrap();
    engine.executor().tick().await.unwrap();

    let runs = store.list_executions(canvas_id, "d").await.unwrap();
    assert_eq!(runs[0].result, Some(ExecutionResult::Failed));
    assert_eq!(
        runs[0].result_reason.as_deref(),
        Some("predicate did not match")
    );
}
