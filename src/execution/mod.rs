//! Execution machinery: context assembly, the state machine, and the
//! pending-execution scheduler.
//!
//! The flow at runtime: an event lands in a node's queue
//! ([`crate::store::QueueItemRow`]); the executor drives the node's
//! `process_queue_item`, which upserts a pending execution; on a later
//! pass the executor claims that execution through the store's
//! single-claim protocol, builds an [`ExecutionContext`], and invokes the
//! component. Everything the component staged (emissions, failure,
//! deferred action calls, metadata) is applied through the claim so the
//! fan-out commits atomically.

pub mod context;
pub mod executor;
pub mod state;

pub use context::{
    ActionContext, CancelContext, ContextBuilder, ExecutionContext, NoSecrets,
    ProcessQueueContext, Secrets, SetupContext,
};
pub use executor::{ExecutorError, NodeExecutor};
pub use state::{CancelError, cancel_execution};
