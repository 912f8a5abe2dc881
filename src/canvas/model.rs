//! The canvas document: nodes, refs, edges, positions.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{DEFAULT_CHANNEL, NodeType};

/// Editor coordinates. Opaque to the engine except for auto-layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Tagged reference to the implementation behind a node.
///
/// The variant must agree with the node's [`NodeType`]; the updater
/// rejects mismatches. A widget reference is display metadata and never
/// resolves to anything executable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    #[serde(rename = "componentRef")]
    Component { component: String },
    #[serde(rename = "blueprintRef")]
    Blueprint { blueprint: String },
    #[serde(rename = "triggerRef")]
    Trigger { trigger: String },
    #[serde(rename = "widgetRef")]
    Widget { widget: String },
}

impl NodeRef {
    /// The referenced implementation name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            NodeRef::Component { component } => component,
            NodeRef::Blueprint { blueprint } => blueprint,
            NodeRef::Trigger { trigger } => trigger,
            NodeRef::Widget { widget } => widget,
        }
    }

    /// The node type this reference belongs to.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeRef::Component { .. } => NodeType::Component,
            NodeRef::Blueprint { .. } => NodeType::Blueprint,
            NodeRef::Trigger { .. } => NodeType::Trigger,
            NodeRef::Widget { .. } => NodeType::Widget,
        }
    }
}

/// One node of a proposed canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(rename = "ref")]
    pub node_ref: NodeRef,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_message: Option<String>,
}

impl Node {
    /// Minimal constructor for programmatic canvas assembly.
    pub fn new(id: impl Into<String>, node_ref: NodeRef) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_ref.node_type(),
            node_ref,
            configuration: Map::new(),
            position: Position::default(),
            is_collapsed: false,
            integration_id: None,
            error_message: None,
            warning_message: None,
        }
    }

    #[must_use]
    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    #[must_use]
    pub fn with_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub fn is_widget(&self) -> bool {
        self.node_type == NodeType::Widget
    }
}

/// A directed edge subscribed to one output channel of its source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

impl Edge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            channel: default_channel(),
        }
    }

    #[must_use]
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

/// The full canvas document as edited by the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub is_template: bool,
}

impl Canvas {
    pub fn new(id: Uuid, organization_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            organization_id,
            name: name.into(),
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            is_template: false,
        }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Mint a fresh node ID that collides with nothing in `reserved`.
///
/// The shape is deterministic: the original ID plus a `-xxxx` hex
/// disambiguator. `reserved` must contain every ID in the canvas, active
/// and tombstoned alike, so the minted ID can never shadow a soft-deleted row.
#[must_use]
pub fn generate_unique_node_id(node_id: &str, reserved: &FxHashSet<String>) -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    loop {
        let suffix: u16 = rng.random();
        let candidate = format!("{node_id}-{suffix:04x}");
        if !reserved.contains(&candidate) {
            return candidate;
        }
    }
}
