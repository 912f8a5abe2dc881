//! # Loomwork: Canvas Workflow Execution Engine
//!
//! Loomwork executes directed workflow graphs ("canvases") where each node
//! is a pluggable component, trigger, widget, or nested sub-graph
//! ("blueprint"). A background scheduler picks up pending executions,
//! claims them without double-dispatch, builds a rich execution context,
//! invokes the user-selected component, and manages retries, cancellation,
//! and child-execution chains for blueprints.
//!
//! ## Core Concepts
//!
//! - **Canvas**: The directed graph edited by the user: nodes, edges
//!   subscribed to output channels, positions.
//! - **Component**: A named, stateless implementation plugged into a node;
//!   all mutable state lives in the contexts it is handed.
//! - **Execution**: One attempt at running a node for a given input event,
//!   with a hermetic configuration snapshot.
//! - **Event**: The sole inter-node signal; edges subscribe by channel and
//!   every event traces back to a root event.
//! - **Blueprint**: A reusable sub-graph embedded as a single node and
//!   flattened into namespaced children at update time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loomwork::canvas::{Canvas, Edge, Node, NodeRef};
//! use loomwork::component::NoopComponent;
//! use loomwork::engine::{Engine, EngineConfig};
//! use loomwork::registry::Registry;
//! use loomwork::store::MemoryStore;
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(
//!     Registry::builder()
//!         .component(Arc::new(NoopComponent))
//!         .build(),
//! );
//! let store = Arc::new(MemoryStore::new());
//! let engine = Engine::new(store, registry, EngineConfig::default());
//!
//! // Propose a two-node canvas: a → b on the default channel.
//! let canvas_id = Uuid::new_v4();
//! let org_id = Uuid::new_v4();
//! let mut canvas = Canvas::new(canvas_id, org_id, "hello");
//! canvas.nodes = vec![
//!     Node::new("a", NodeRef::Component { component: "noop".into() }),
//!     Node::new("b", NodeRef::Component { component: "noop".into() }),
//! ];
//! canvas.edges = vec![Edge::new("a", "b")];
//! engine.update_canvas(org_id, canvas_id, canvas, None).await?;
//!
//! // Feed a root event into `a`; one executor tick runs the chain.
//! engine.emit_node_event(canvas_id, "a", json!({"hello": "world"})).await?;
//! engine.executor().tick().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`canvas`] - Graph model, blueprint expansion, auto-layout, updater
//! - [`component`] - The component contract and built-in exemplars
//! - [`execution`] - Context assembly, state machine, the scheduler
//! - [`store`] - Persistence contracts, in-memory and Postgres backends
//! - [`registry`] - Name → implementation catalogue and shared HTTP client
//! - [`schema`] - Declarative configuration fields and the wire codec
//! - [`engine`] - The assembled facade the transport layer calls into

pub mod canvas;
pub mod component;
pub mod engine;
pub mod execution;
pub mod expr;
pub mod memory;
pub mod notify;
pub mod registry;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod webhook;
