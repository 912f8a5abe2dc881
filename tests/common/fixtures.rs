#![allow(dead_code)]

use std::sync::Arc;

use loomwork::canvas::{Blueprint, Canvas, Edge, Node, NodeRef};
use loomwork::component::{HttpComponent, NoopComponent};
use loomwork::engine::{Engine, EngineConfig};
use loomwork::registry::Registry;
use loomwork::store::MemoryStore;
use uuid::Uuid;

use super::components::{DomainFailComponent, FailingComponent, FlakySetupComponent};

pub fn component_node(id: &str, component: &str) -> Node {
    Node::new(
        id,
        NodeRef::Component {
            component: component.into(),
        },
    )
}

pub fn noop_node(id: &str) -> Node {
    component_node(id, "noop")
}

pub fn widget_node(id: &str) -> Node {
    Node::new(
        id,
        NodeRef::Widget {
            widget: "note".into(),
        },
    )
}

pub fn blueprint_node(id: &str, blueprint: &str) -> Node {
    Node::new(
        id,
        NodeRef::Blueprint {
            blueprint: blueprint.into(),
        },
    )
}

/// A two-step blueprint `a → b` (both no-ops) with a display-only widget
/// that expansion must drop.
pub fn pair_blueprint() -> Blueprint {
    Blueprint {
        name: "pair".into(),
        label: "Pair".into(),
        description: "Two chained no-ops".into(),
        nodes: vec![noop_node("a"), noop_node("b"), widget_node("note")],
        edges: vec![Edge::new("a", "b")],
        output_channels: vec!["default".into()],
        configuration: Vec::new(),
    }
}

pub fn test_registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .component(Arc::new(NoopComponent))
            .component(Arc::new(HttpComponent))
            .component(Arc::new(FailingComponent))
            .component(Arc::new(DomainFailComponent))
            .component(Arc::new(FlakySetupComponent::new()))
            .blueprint(pair_blueprint())
            .build(),
    )
}

pub fn test_engine() -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn loomwork::store::EngineStore>,
        test_registry(),
        EngineConfig::default(),
    );
    (engine, store)
}

pub fn canvas_with(
    canvas_id: Uuid,
    organization_id: Uuid,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
) -> Canvas {
    let mut canvas = Canvas::new(canvas_id, organization_id, "test-canvas");
    canvas.nodes = nodes;
    canvas.edges = edges;
    canvas
}
