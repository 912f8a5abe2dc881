//! Persisted row shapes for the engine store.
//!
//! These are the storage-facing counterparts of the canvas document: the
//! flattened per-node rows, the FIFO queue items that hand events to
//! nodes, execution rows with their configuration snapshots, emitted
//! events, deferred action requests, and the append-only canvas memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::canvas::model::{Canvas, NodeRef, Position};
use crate::types::{ExecutionResult, ExecutionState, NodeState, NodeType, RequestType};

/// A stored canvas document plus row timestamps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanvasRow {
    pub canvas: Canvas,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted (possibly blueprint-expanded) canvas node.
///
/// Soft-deleted rows keep their `deleted_at` timestamp and stay visible to
/// unscoped lookups so historical execution rows never lose their parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNodeRow {
    pub workflow_id: Uuid,
    pub node_id: String,
    /// For blueprint internals: the embedding blueprint node's ID. The
    /// internal ID's prefix up to `:` is exactly this value.
    pub parent_node_id: Option<String>,
    pub name: String,
    pub node_type: NodeType,
    pub state: NodeState,
    pub state_reason: Option<String>,
    pub node_ref: NodeRef,
    pub configuration: Map<String, Value>,
    pub position: Position,
    pub is_collapsed: bool,
    /// Component-owned opaque slot, e.g. resolved webhook identifiers.
    pub metadata: Value,
    pub app_installation_id: Option<String>,
    pub webhook_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CanvasNodeRow {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// FIFO handoff between an upstream event and node-specific processing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub node_id: String,
    pub event_id: Uuid,
    pub root_event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Input for enqueueing a queue item; the store assigns ID and timestamp.
#[derive(Clone, Debug)]
pub struct NewQueueItem {
    pub workflow_id: Uuid,
    pub node_id: String,
    pub event_id: Uuid,
    pub root_event_id: Uuid,
}

impl NewQueueItem {
    pub(crate) fn into_row(self, id: Uuid, now: DateTime<Utc>) -> QueueItemRow {
        QueueItemRow {
            id,
            workflow_id: self.workflow_id,
            node_id: self.node_id,
            event_id: self.event_id,
            root_event_id: self.root_event_id,
            created_at: now,
        }
    }
}

/// One attempt at running a node for a given input event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub node_id: String,
    pub root_event_id: Uuid,
    pub event_id: Uuid,
    pub previous_execution_id: Option<Uuid>,
    /// Links a blueprint's sub-graph executions to the outer execution.
    pub parent_execution_id: Option<Uuid>,
    pub state: ExecutionState,
    pub result: Option<ExecutionResult>,
    pub result_reason: Option<String>,
    /// Configuration snapshot taken at creation; replays are hermetic.
    pub configuration: Map<String, Value>,
    /// Component-defined opaque slot (retry counters, cursors, ...).
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
}

/// Input for creating an execution; the store assigns ID, state, and
/// timestamps (always created `pending`).
#[derive(Clone, Debug)]
pub struct NewExecution {
    pub workflow_id: Uuid,
    pub node_id: String,
    pub root_event_id: Uuid,
    pub event_id: Uuid,
    pub previous_execution_id: Option<Uuid>,
    pub parent_execution_id: Option<Uuid>,
    pub configuration: Map<String, Value>,
    pub metadata: Value,
}

impl NewExecution {
    pub(crate) fn into_row(self, id: Uuid, now: DateTime<Utc>) -> ExecutionRow {
        ExecutionRow {
            id,
            workflow_id: self.workflow_id,
            node_id: self.node_id,
            root_event_id: self.root_event_id,
            event_id: self.event_id,
            previous_execution_id: self.previous_execution_id,
            parent_execution_id: self.parent_execution_id,
            state: ExecutionState::Pending,
            result: None,
            result_reason: None,
            configuration: self.configuration,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
            finished_at: None,
            cancelled_by: None,
        }
    }
}

/// An event emitted on an output channel; the sole inter-node signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub node_id: String,
    pub channel: String,
    pub event_type: String,
    pub data: Value,
    pub execution_id: Option<Uuid>,
    /// The originating external event of the whole downstream fan-out.
    pub root_event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Input for appending an event.
///
/// `root_event_id = None` marks a *root* event: the stored row's
/// `root_event_id` becomes its own ID.
#[derive(Clone, Debug)]
pub struct NewEvent {
    pub workflow_id: Uuid,
    pub node_id: String,
    pub channel: String,
    pub event_type: String,
    pub data: Value,
    pub execution_id: Option<Uuid>,
    pub root_event_id: Option<Uuid>,
}

impl NewEvent {
    pub(crate) fn into_row(self, id: Uuid, now: DateTime<Utc>) -> EventRow {
        EventRow {
            id,
            workflow_id: self.workflow_id,
            node_id: self.node_id,
            channel: self.channel,
            event_type: self.event_type,
            data: self.data,
            execution_id: self.execution_id,
            root_event_id: self.root_event_id.unwrap_or(id),
            created_at: now,
        }
    }
}

/// A deferred, named invocation delivered back into a component's
/// `handle_action`; models retries and timers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequestRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub request_type: RequestType,
    pub action_name: String,
    pub parameters: Value,
    pub run_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for scheduling a request.
#[derive(Clone, Debug)]
pub struct NewRequest {
    pub execution_id: Uuid,
    pub action_name: String,
    pub parameters: Value,
    pub run_at: DateTime<Utc>,
}

impl NewRequest {
    pub(crate) fn into_row(self, id: Uuid) -> ExecutionRequestRow {
        ExecutionRequestRow {
            id,
            execution_id: self.execution_id,
            request_type: RequestType::InvokeAction,
            action_name: self.action_name,
            parameters: self.parameters,
            run_at: self.run_at,
            completed_at: None,
        }
    }
}

/// One append-only canvas-memory record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRow {
    pub id: Uuid,
    pub canvas_id: Uuid,
    pub namespace: String,
    pub values: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
