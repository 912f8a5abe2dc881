//! Storage contracts for the canvas engine.
//!
//! [`EngineStore`] is the backend-neutral persistence trait; every
//! deployment gets the in-memory implementation ([`MemoryStore`]) and,
//! behind the `postgres` feature, a Postgres implementation with real
//! row-locking ([`PostgresStore`]).
//!
//! # The claim protocol
//!
//! The one non-obvious contract is [`EngineStore::lock_pending_execution`]:
//! it returns an [`ExecutionClaim`] guard that owns a transaction (or the
//! in-memory equivalent). Every write a worker performs for a claimed
//! execution (state transitions, emitted events, downstream queue items,
//! child executions, metadata, scheduled requests) goes through the guard
//! and becomes visible atomically at [`ExecutionClaim::commit`]. Dropping
//! the guard without committing releases the row with the execution still
//! `pending`, so a crashed worker's claim is simply retried on the next
//! tick. At most one claim per execution can exist at a time; losers get
//! [`StoreError::RecordLocked`], which callers treat as a benign skip.

pub mod memory;
pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::canvas::model::Canvas;
use crate::types::{ExecutionResult, NodeState};

pub use memory::MemoryStore;
pub use models::{
    CanvasNodeRow, CanvasRow, EventRow, ExecutionRequestRow, ExecutionRow, MemoryRow, NewEvent,
    NewExecution, NewQueueItem, NewRequest, QueueItemRow,
};
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Errors surfaced by store implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// The referenced row does not exist (scoped lookups also return this
    /// for soft-deleted rows).
    #[error("{what} not found: {id}")]
    #[diagnostic(code(loomwork::store::not_found))]
    NotFound { what: &'static str, id: String },

    /// Another worker holds the row, or its state moved on. Benign: the
    /// caller skips silently, no log, no retry in the current tick.
    #[error("record locked")]
    #[diagnostic(code(loomwork::store::record_locked))]
    RecordLocked,

    /// The operation contradicts current state (e.g. appending to a
    /// committed claim).
    #[error("conflict: {message}")]
    #[diagnostic(code(loomwork::store::conflict))]
    Conflict { message: String },

    /// Backend I/O failure; the caller may retry on a later tick.
    #[error("store backend error: {message}")]
    #[diagnostic(code(loomwork::store::backend))]
    Backend { message: String },

    #[error(transparent)]
    #[diagnostic(code(loomwork::store::serde))]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_record_locked(&self) -> bool {
        matches!(self, StoreError::RecordLocked)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Transactional guard over one claimed pending execution.
///
/// See the module docs for visibility and drop semantics.
#[async_trait]
pub trait ExecutionClaim: Send {
    /// The claimed row as read under the lock.
    fn execution(&self) -> &ExecutionRow;

    /// Transition the claimed execution `pending → started`.
    async fn mark_started(&mut self) -> Result<()>;

    /// Terminate the claimed execution with the given result.
    async fn finish(&mut self, result: ExecutionResult, reason: Option<String>) -> Result<()>;

    /// Replace the execution's component-owned metadata.
    async fn set_metadata(&mut self, metadata: Value) -> Result<()>;

    /// Append an emitted event within the claim's transaction.
    async fn append_event(&mut self, event: NewEvent) -> Result<EventRow>;

    /// Enqueue a downstream queue item within the claim's transaction.
    async fn enqueue_item(&mut self, item: NewQueueItem) -> Result<QueueItemRow>;

    /// Create a child execution (blueprint fan-out) within the claim's
    /// transaction.
    async fn create_child_execution(&mut self, new: NewExecution) -> Result<ExecutionRow>;

    /// Schedule a deferred action request within the claim's transaction.
    async fn schedule_request(&mut self, request: NewRequest) -> Result<ExecutionRequestRow>;

    /// Commit everything staged on this claim and release the row.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Backend-neutral persistence for canvases, nodes, queue items,
/// executions, events, requests, and canvas memory.
#[async_trait]
pub trait EngineStore: Send + Sync {
    // ── Canvases ──

    async fn upsert_canvas(&self, canvas: &Canvas) -> Result<()>;
    async fn get_canvas(&self, id: Uuid) -> Result<CanvasRow>;
    async fn list_canvases(&self, organization_id: Uuid) -> Result<Vec<CanvasRow>>;
    async fn delete_canvas(&self, id: Uuid) -> Result<()>;

    // ── Canvas nodes ──

    async fn upsert_node(&self, node: &CanvasNodeRow) -> Result<()>;
    /// Scoped lookup; soft-deleted rows are invisible.
    async fn get_node(&self, workflow_id: Uuid, node_id: &str) -> Result<CanvasNodeRow>;
    /// Unscoped lookup; sees tombstones (historical executions resolve
    /// their parent through this).
    async fn get_node_unscoped(&self, workflow_id: Uuid, node_id: &str) -> Result<CanvasNodeRow>;
    async fn list_nodes(&self, workflow_id: Uuid) -> Result<Vec<CanvasNodeRow>>;
    /// Every node ID ever used on this canvas, tombstoned or live. The ID
    /// minter treats all of them as reserved.
    async fn reserved_node_ids(&self, workflow_id: Uuid) -> Result<Vec<String>>;
    async fn set_node_state(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        state: NodeState,
        reason: Option<String>,
    ) -> Result<()>;
    async fn set_node_metadata(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        metadata: Value,
    ) -> Result<()>;
    async fn soft_delete_node(&self, workflow_id: Uuid, node_id: &str) -> Result<()>;

    // ── Queue items ──

    async fn enqueue_item(&self, item: NewQueueItem) -> Result<QueueItemRow>;
    async fn list_queue_items(&self, workflow_id: Uuid, node_id: &str) -> Result<Vec<QueueItemRow>>;
    /// Oldest-first batch across all canvases, for the executor tick.
    async fn pending_queue_items(&self, limit: usize) -> Result<Vec<QueueItemRow>>;
    async fn dequeue_item(&self, id: Uuid) -> Result<()>;

    // ── Events ──

    async fn append_event(&self, event: NewEvent) -> Result<EventRow>;
    async fn get_event(&self, id: Uuid) -> Result<EventRow>;
    async fn list_events(&self, workflow_id: Uuid, node_id: &str) -> Result<Vec<EventRow>>;

    // ── Executions ──

    async fn create_execution(&self, new: NewExecution) -> Result<ExecutionRow>;
    async fn get_execution(&self, id: Uuid) -> Result<ExecutionRow>;
    /// Oldest-first batch of rows in state `pending`.
    async fn list_pending_executions(&self, limit: usize) -> Result<Vec<ExecutionRow>>;
    async fn list_executions(&self, workflow_id: Uuid, node_id: &str) -> Result<Vec<ExecutionRow>>;
    async fn list_child_executions(&self, parent_execution_id: Uuid) -> Result<Vec<ExecutionRow>>;
    /// Most recent execution of a node, if any.
    async fn latest_execution_for_node(
        &self,
        workflow_id: Uuid,
        node_id: &str,
    ) -> Result<Option<ExecutionRow>>;
    async fn set_execution_metadata(&self, id: Uuid, metadata: Value) -> Result<()>;
    /// Terminate an active execution outside the claim path (used when
    /// deferred work completes through `handle_action`). Terminal rows
    /// return [`StoreError::Conflict`].
    async fn finish_execution(
        &self,
        id: Uuid,
        result: ExecutionResult,
        reason: Option<String>,
    ) -> Result<ExecutionRow>;
    /// Cancel the execution and every non-terminal descendant in one
    /// atomic operation. Returns the rows that were transitioned.
    async fn cancel_execution_tree(
        &self,
        id: Uuid,
        cancelled_by: &str,
    ) -> Result<Vec<ExecutionRow>>;

    /// Claim a pending execution. See the module docs; losers get
    /// [`StoreError::RecordLocked`].
    async fn lock_pending_execution(&self, id: Uuid) -> Result<Box<dyn ExecutionClaim>>;

    // ── Execution requests ──

    async fn schedule_request(&self, request: NewRequest) -> Result<ExecutionRequestRow>;
    async fn due_requests(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionRequestRow>>;
    async fn complete_request(&self, id: Uuid) -> Result<()>;

    // ── Canvas memory ──

    async fn memory_add(&self, canvas_id: Uuid, namespace: &str, values: Value)
    -> Result<MemoryRow>;
    async fn memory_list(&self, canvas_id: Uuid, namespace: &str) -> Result<Vec<MemoryRow>>;
}
