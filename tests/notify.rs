mod common;

use common::*;
use loomwork::engine::{Engine, EngineConfig};
use loomwork::execution::NoSecrets;
use loomwork::expr::LiteralEvaluator;
use loomwork::notify::{CANVAS_UPDATED, MemorySink, NoticeHub};
use loomwork::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_canvas_update_publishes_a_notice() {
    let sink = MemorySink::new();
    let hub = NoticeHub::with_sinks(vec![Arc::new(sink.clone())]);
    let engine = Engine::with_services(
        Arc::new(MemoryStore::new()),
        test_registry(),
        Arc::new(LiteralEvaluator),
        Arc::new(NoSecrets),
        hub,
        EngineConfig::default(),
    );

    let canvas_id = Uuid::new_v4();
    let org = Uuid::new_v4();
    let canvas = canvas_with(canvas_id, org, vec![noop_node("a")], vec![]);
    engine
        .update_canvas(org, canvas_id, canvas, None)
        .await
        .unwrap();

    // The hub drains from a background task; give it a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let notices = sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, CANVAS_UPDATED);
    assert_eq!(
        notices[0].payload["canvasId"],
        serde_json::json!(canvas_id)
    );
}
