//! Canvas graph model, blueprint expansion, auto-layout, and the updater.
//!
//! A canvas is the user-edited directed graph: nodes (components,
//! triggers, blueprints, widgets), edges subscribed to output channels,
//! and positions. [`update`] turns a proposed canvas into persisted state;
//! [`blueprint`] flattens nested sub-graphs; [`layout`] recomputes
//! positions for the editor.

pub mod blueprint;
pub mod layout;
pub mod model;
pub mod update;

pub use blueprint::{Blueprint, ExpandedNode, expand_blueprints};
pub use layout::{LayoutError, LayoutRequest, LayoutScope, auto_layout};
pub use model::{Canvas, Edge, Node, NodeRef, Position, generate_unique_node_id};
pub use update::{CanvasUpdater, UpdateError, UpdateOutcome};
