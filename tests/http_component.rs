mod common;

use common::*;
use httpmock::prelude::*;
use loomwork::store::EngineStore;
use loomwork::types::{DEFAULT_CHANNEL, ExecutionResult, ExecutionState};
use serde_json::{Map, json};
use std::time::Duration;
use uuid::Uuid;

fn http_node(id: &str, url: String, retries: u64) -> loomwork::canvas::Node {
    let mut configuration = Map::new();
    configuration.insert("method".into(), json!("GET"));
    configuration.insert("url".into(), json!(url));
    configuration.insert("timeoutStrategy".into(), json!("fixed"));
    configuration.insert("timeoutSeconds".into(), json!(1));
    configuration.insert("retries".into(), json!(retries));
    component_node(id, "http").with_configuration(configuration)
}

#[tokio::test]
async fn test_http_retry_contract_two_failures_then_success() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(500);
        })
        .await;

    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![http_node("req", server.url("/flaky"), 2)],
        vec![],
    );
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    engine
        .emit_node_event(canvas_id, "req", json!({}))
        .await
        .unwrap();

    // Attempt 1: 500 → a retry is scheduled, the execution stays open.
    engine.executor().tick().await.unwrap();
    failing.assert_hits_async(1).await;
    let runs = store.list_executions(canvas_id, "req").await.unwrap();
    assert_eq!(runs.len(), 1);
    let id = runs[0].id;
    assert_eq!(runs[0].state, ExecutionState::Started);
    assert_eq!(runs[0].metadata["attempt"], json!(1));

    // Attempt 2 (delivered via handle_action): 500 again.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    engine.executor().tick().await.unwrap();
    failing.assert_hits_async(2).await;

    // The endpoint recovers before attempt 3.
    failing.delete_async().await;
    let healthy = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(200).body("ok");
        })
        .await;

    tokio::time::sleep(Duration::from_millis(1200)).await;
    engine.executor().tick().await.unwrap();
    healthy.assert_hits_async(1).await;

    let run = store.get_execution(id).await.unwrap();
    assert_eq!(run.state, ExecutionState::Finished);
    assert_eq!(run.result, Some(ExecutionResult::Passed));
    assert_eq!(run.metadata["totalRetries"], json!(2));
    assert_eq!(run.metadata["finalStatus"], json!(200));

    // Exactly one http.request.finished on the default channel.
    let events = store.list_events(canvas_id, "req").await.unwrap();
    let finished: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "http.request.finished")
        .collect();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].channel, DEFAULT_CHANNEL);
    assert_eq!(finished[0].data["status"], json!(200));
}

#[tokio::test]
async fn test_http_exhausted_retries_fail_the_execution() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/down");
            then.status(503);
        })
        .await;

    let (engine, store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(
        canvas_id,
        org,
        vec![http_node("req", server.url("/down"), 0)],
        vec![],
    );
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();
    engine
        .emit_node_event(canvas_id, "req", json!({}))
        .await
        .unwrap();
    engine.executor().tick().await.unwrap();

    failing.assert_hits_async(1).await;
    let runs = store.list_executions(canvas_id, "req").await.unwrap();
    assert_eq!(runs[0].state, ExecutionState::Finished);
    assert_eq!(runs[0].result, Some(ExecutionResult::Error));
    assert!(
        runs[0]
            .result_reason
            .as_deref()
            .unwrap_or_default()
            .contains("unexpected status code: 503")
    );
}
