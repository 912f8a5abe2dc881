mod common;

use common::*;
use loomwork::memory::MemoryError;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_memory_is_append_only_and_ordered() {
    let (engine, _store) = test_engine();
    let canvas_id = Uuid::new_v4();
    let memory = engine.memory(canvas_id);

    memory.add("leads", json!({"name": "ada"})).await.unwrap();
    memory.add("leads", json!({"name": "grace"})).await.unwrap();
    memory.add("other", json!({"name": "linus"})).await.unwrap();

    let leads = memory.list("leads").await.unwrap();
    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0].values, json!({"name": "ada"}));
    assert_eq!(leads[1].values, json!({"name": "grace"}));

    let other = memory.list("other").await.unwrap();
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn test_memory_requires_namespace_and_values() {
    let (engine, _store) = test_engine();
    let memory = engine.memory(Uuid::new_v4());

    let err = memory.add("", json!({"x": 1})).await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidArgument(_)));

    let err = memory.add("ns", serde_json::Value::Null).await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_memory_is_scoped_per_canvas() {
    let (engine, _store) = test_engine();
    let first = engine.memory(Uuid::new_v4());
    let second = engine.memory(Uuid::new_v4());

    first.add("ns", json!({"a": 1})).await.unwrap();
    assert!(second.list("ns").await.unwrap().is_empty());
}
