//! In-memory [`EngineStore`] implementation.
//!
//! Always available; powers the test suite and embedded single-process
//! use. The claim protocol is modelled with a lock-set plus staged
//! writes: a claim's writes are buffered on the guard and applied to the
//! shared state only at commit, which gives the same visibility rules as
//! the Postgres transaction: readers never observe a half-processed
//! execution, and a dropped claim leaves the row pending.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde_json::Value;
use uuid::Uuid;

use super::models::*;
use super::{EngineStore, ExecutionClaim, Result, StoreError};
use crate::canvas::model::Canvas;
use crate::types::{ExecutionResult, ExecutionState, NodeState};

#[derive(Default)]
struct Inner {
    canvases: Vec<CanvasRow>,
    nodes: Vec<CanvasNodeRow>,
    queue: Vec<QueueItemRow>,
    events: Vec<EventRow>,
    executions: Vec<ExecutionRow>,
    requests: Vec<ExecutionRequestRow>,
    memories: Vec<MemoryRow>,
    /// Execution IDs currently held by a claim.
    locked: FxHashSet<Uuid>,
}

/// Shared-state in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = self.inner.lock().expect("memory store poisoned");
        f(&mut guard)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish()
    }
}

fn not_found(what: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        what,
        id: id.to_string(),
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    async fn upsert_canvas(&self, canvas: &Canvas) -> Result<()> {
        let now = Utc::now();
        self.with(|inner| {
            if let Some(row) = inner.canvases.iter_mut().find(|c| c.canvas.id == canvas.id) {
                row.canvas = canvas.clone();
                row.updated_at = now;
            } else {
                inner.canvases.push(CanvasRow {
                    canvas: canvas.clone(),
                    created_at: now,
                    updated_at: now,
                });
            }
        });
        Ok(())
    }

    async fn get_canvas(&self, id: Uuid) -> Result<CanvasRow> {
        self.with(|inner| {
            inner
                .canvases
                .iter()
                .find(|c| c.canvas.id == id)
                .cloned()
                .ok_or_else(|| not_found("canvas", id))
        })
    }

    async fn list_canvases(&self, organization_id: Uuid) -> Result<Vec<CanvasRow>> {
        self.with(|inner| {
            Ok(inner
                .canvases
                .iter()
                .filter(|c| c.canvas.organization_id == organization_id)
                .cloned()
                .collect())
        })
    }

    async fn delete_canvas(&self, id: Uuid) -> Result<()> {
        self.with(|inner| {
            let before = inner.canvases.len();
            inner.canvases.retain(|c| c.canvas.id != id);
            if inner.canvases.len() == before {
                Err(not_found("canvas", id))
            } else {
                Ok(())
            }
        })
    }

    async fn upsert_node(&self, node: &CanvasNodeRow) -> Result<()> {
        let now = Utc::now();
        self.with(|inner| {
            if let Some(existing) = inner
                .nodes
                .iter_mut()
                .find(|n| n.workflow_id == node.workflow_id && n.node_id == node.node_id)
            {
                let created_at = existing.created_at;
                *existing = node.clone();
                existing.created_at = created_at;
                existing.updated_at = now;
            } else {
                let mut row = node.clone();
                row.created_at = now;
                row.updated_at = now;
                inner.nodes.push(row);
            }
        });
        Ok(())
    }

    async fn get_node(&self, workflow_id: Uuid, node_id: &str) -> Result<CanvasNodeRow> {
        self.with(|inner| {
            inner
                .nodes
                .iter()
                .find(|n| n.workflow_id == workflow_id && n.node_id == node_id && !n.is_deleted())
                .cloned()
                .ok_or_else(|| not_found("canvas node", node_id))
        })
    }

    async fn get_node_unscoped(&self, workflow_id: Uuid, node_id: &str) -> Result<CanvasNodeRow> {
        self.with(|inner| {
            inner
                .nodes
                .iter()
                .find(|n| n.workflow_id == workflow_id && n.node_id == node_id)
                .cloned()
                .ok_or_else(|| not_found("canvas node", node_id))
        })
    }

    async fn list_nodes(&self, workflow_id: Uuid) -> Result<Vec<CanvasNodeRow>> {
        self.with(|inner| {
            Ok(inner
                .nodes
                .iter()
                .filter(|n| n.workflow_id == workflow_id && !n.is_deleted())
                .cloned()
                .collect())
        })
    }

    async fn reserved_node_ids(&self, workflow_id: Uuid) -> Result<Vec<String>> {
        self.with(|inner| {
            Ok(inner
                .nodes
                .iter()
                .filter(|n| n.workflow_id == workflow_id)
                .map(|n| n.node_id.clone())
                .collect())
        })
    }

    async fn set_node_state(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        state: NodeState,
        reason: Option<String>,
    ) -> Result<()> {
        self.with(|inner| {
            let node = inner
                .nodes
                .iter_mut()
                .find(|n| n.workflow_id == workflow_id && n.node_id == node_id && !n.is_deleted())
                .ok_or_else(|| not_found("canvas node", node_id))?;
            node.state = state;
            node.state_reason = reason;
            node.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn set_node_metadata(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        metadata: Value,
    ) -> Result<()> {
        self.with(|inner| {
            let node = inner
                .nodes
                .iter_mut()
                .find(|n| n.workflow_id == workflow_id && n.node_id == node_id && !n.is_deleted())
                .ok_or_else(|| not_found("canvas node", node_id))?;
            node.metadata = metadata;
            node.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn soft_delete_node(&self, workflow_id: Uuid, node_id: &str) -> Result<()> {
        self.with(|inner| {
            let node = inner
                .nodes
                .iter_mut()
                .find(|n| n.workflow_id == workflow_id && n.node_id == node_id && !n.is_deleted())
                .ok_or_else(|| not_found("canvas node", node_id))?;
            node.deleted_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn enqueue_item(&self, item: NewQueueItem) -> Result<QueueItemRow> {
        let row = item.into_row(Uuid::new_v4(), Utc::now());
        self.with(|inner| inner.queue.push(row.clone()));
        Ok(row)
    }

    async fn list_queue_items(
        &self,
        workflow_id: Uuid,
        node_id: &str,
    ) -> Result<Vec<QueueItemRow>> {
        self.with(|inner| {
            Ok(inner
                .queue
                .iter()
                .filter(|q| q.workflow_id == workflow_id && q.node_id == node_id)
                .cloned()
                .collect())
        })
    }

    async fn pending_queue_items(&self, limit: usize) -> Result<Vec<QueueItemRow>> {
        self.with(|inner| Ok(inner.queue.iter().take(limit).cloned().collect()))
    }

    async fn dequeue_item(&self, id: Uuid) -> Result<()> {
        self.with(|inner| {
            let before = inner.queue.len();
            inner.queue.retain(|q| q.id != id);
            if inner.queue.len() == before {
                Err(not_found("queue item", id))
            } else {
                Ok(())
            }
        })
    }

    async fn append_event(&self, event: NewEvent) -> Result<EventRow> {
        let row = event.into_row(Uuid::new_v4(), Utc::now());
        self.with(|inner| inner.events.push(row.clone()));
        Ok(row)
    }

    async fn get_event(&self, id: Uuid) -> Result<EventRow> {
        self.with(|inner| {
            inner
                .events
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| not_found("event", id))
        })
    }

    async fn list_events(&self, workflow_id: Uuid, node_id: &str) -> Result<Vec<EventRow>> {
        self.with(|inner| {
            Ok(inner
                .events
                .iter()
                .filter(|e| e.workflow_id == workflow_id && e.node_id == node_id)
                .cloned()
                .collect())
        })
    }

    async fn create_execution(&self, new: NewExecution) -> Result<ExecutionRow> {
        let row = new.into_row(Uuid::new_v4(), Utc::now());
        self.with(|inner| inner.executions.push(row.clone()));
        Ok(row)
    }

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionRow> {
        self.with(|inner| {
            inner
                .executions
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| not_found("execution", id))
        })
    }

    async fn list_pending_executions(&self, limit: usize) -> Result<Vec<ExecutionRow>> {
        self.with(|inner| {
            Ok(inner
                .executions
                .iter()
                .filter(|e| e.state == ExecutionState::Pending)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    async fn list_executions(&self, workflow_id: Uuid, node_id: &str) -> Result<Vec<ExecutionRow>> {
        self.with(|inner| {
            Ok(inner
                .executions
                .iter()
                .filter(|e| e.workflow_id == workflow_id && e.node_id == node_id)
                .cloned()
                .collect())
        })
    }

    async fn list_child_executions(&self, parent_execution_id: Uuid) -> Result<Vec<ExecutionRow>> {
        self.with(|inner| {
            Ok(inner
                .executions
                .iter()
                .filter(|e| e.parent_execution_id == Some(parent_execution_id))
                .cloned()
                .collect())
        })
    }

    async fn latest_execution_for_node(
        &self,
        workflow_id: Uuid,
        node_id: &str,
    ) -> Result<Option<ExecutionRow>> {
        self.with(|inner| {
            Ok(inner
                .executions
                .iter()
                .rev()
                .find(|e| e.workflow_id == workflow_id && e.node_id == node_id)
                .cloned())
        })
    }

    async fn set_execution_metadata(&self, id: Uuid, metadata: Value) -> Result<()> {
        self.with(|inner| {
            let row = inner
                .executions
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| not_found("execution", id))?;
            row.metadata = metadata;
            row.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn finish_execution(
        &self,
        id: Uuid,
        result: ExecutionResult,
        reason: Option<String>,
    ) -> Result<ExecutionRow> {
        let now = Utc::now();
        self.with(|inner| {
            let row = inner
                .executions
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| not_found("execution", id))?;
            if row.state.is_terminal() {
                return Err(StoreError::Conflict {
                    message: format!("execution {id} is already {}", row.state),
                });
            }
            row.state = ExecutionState::Finished;
            row.result = Some(result);
            row.result_reason = reason;
            row.finished_at = Some(now);
            row.updated_at = now;
            Ok(row.clone())
        })
    }

    async fn cancel_execution_tree(
        &self,
        id: Uuid,
        cancelled_by: &str,
    ) -> Result<Vec<ExecutionRow>> {
        let now = Utc::now();
        self.with(|inner| {
            let root = inner
                .executions
                .iter()
                .find(|e| e.id == id)
                .ok_or_else(|| not_found("execution", id))?;
            if root.state.is_terminal() {
                return Err(StoreError::Conflict {
                    message: format!("execution {id} is already {}", root.state),
                });
            }

            // Breadth-first over parent_execution_id links.
            let mut to_cancel = vec![id];
            let mut frontier = vec![id];
            while let Some(parent) = frontier.pop() {
                for child in inner
                    .executions
                    .iter()
                    .filter(|e| e.parent_execution_id == Some(parent) && e.state.is_active())
                {
                    to_cancel.push(child.id);
                    frontier.push(child.id);
                }
            }

            let mut cancelled = Vec::with_capacity(to_cancel.len());
            for exec_id in to_cancel {
                if let Some(row) = inner.executions.iter_mut().find(|e| e.id == exec_id) {
                    if row.state.is_terminal() {
                        continue;
                    }
                    row.state = ExecutionState::Cancelled;
                    row.result = Some(ExecutionResult::Cancelled);
                    row.cancelled_by = Some(cancelled_by.to_string());
                    row.finished_at = Some(now);
                    row.updated_at = now;
                    cancelled.push(row.clone());
                }
            }
            Ok(cancelled)
        })
    }

    async fn lock_pending_execution(&self, id: Uuid) -> Result<Box<dyn ExecutionClaim>> {
        let row = self.with(|inner| {
            let row = inner
                .executions
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| not_found("execution", id))?;
            if row.state != ExecutionState::Pending || inner.locked.contains(&id) {
                return Err(StoreError::RecordLocked);
            }
            inner.locked.insert(id);
            Ok(row)
        })?;
        Ok(Box::new(MemoryClaim {
            inner: Arc::clone(&self.inner),
            row,
            staged: Vec::new(),
            committed: false,
        }))
    }

    async fn schedule_request(&self, request: NewRequest) -> Result<ExecutionRequestRow> {
        let row = request.into_row(Uuid::new_v4());
        self.with(|inner| inner.requests.push(row.clone()));
        Ok(row)
    }

    async fn due_requests(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionRequestRow>> {
        self.with(|inner| {
            let mut due: Vec<_> = inner
                .requests
                .iter()
                .filter(|r| r.completed_at.is_none() && r.run_at <= now)
                .cloned()
                .collect();
            due.sort_by_key(|r| r.run_at);
            due.truncate(limit);
            Ok(due)
        })
    }

    async fn complete_request(&self, id: Uuid) -> Result<()> {
        self.with(|inner| {
            let row = inner
                .requests
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| not_found("execution request", id))?;
            row.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn memory_add(
        &self,
        canvas_id: Uuid,
        namespace: &str,
        values: Value,
    ) -> Result<MemoryRow> {
        let now = Utc::now();
        let row = MemoryRow {
            id: Uuid::new_v4(),
            canvas_id,
            namespace: namespace.to_string(),
            values,
            created_at: now,
            updated_at: now,
        };
        self.with(|inner| inner.memories.push(row.clone()));
        Ok(row)
    }

    async fn memory_list(&self, canvas_id: Uuid, namespace: &str) -> Result<Vec<MemoryRow>> {
        self.with(|inner| {
            Ok(inner
                .memories
                .iter()
                .filter(|m| m.canvas_id == canvas_id && m.namespace == namespace)
                .cloned()
                .collect())
        })
    }
}

enum Staged {
    Execution(ExecutionRow),
    Event(EventRow),
    Queue(QueueItemRow),
    Child(ExecutionRow),
    Request(ExecutionRequestRow),
}

/// Claim guard for the memory backend: buffers writes, applies at commit.
struct MemoryClaim {
    inner: Arc<Mutex<Inner>>,
    row: ExecutionRow,
    staged: Vec<Staged>,
    committed: bool,
}

impl MemoryClaim {
    fn stage_row_update(&mut self) {
        let snapshot = self.row.clone();
        // Only the latest row snapshot matters; drop earlier ones.
        self.staged
            .retain(|s| !matches!(s, Staged::Execution(_)));
        self.staged.push(Staged::Execution(snapshot));
    }
}

#[async_trait]
impl ExecutionClaim for MemoryClaim {
    fn execution(&self) -> &ExecutionRow {
        &self.row
    }

    async fn mark_started(&mut self) -> Result<()> {
        self.row.state = ExecutionState::Started;
        self.row.updated_at = Utc::now();
        self.stage_row_update();
        Ok(())
    }

    async fn finish(&mut self, result: ExecutionResult, reason: Option<String>) -> Result<()> {
        let now = Utc::now();
        self.row.state = ExecutionState::Finished;
        self.row.result = Some(result);
        self.row.result_reason = reason;
        self.row.finished_at = Some(now);
        self.row.updated_at = now;
        self.stage_row_update();
        Ok(())
    }

    async fn set_metadata(&mut self, metadata: Value) -> Result<()> {
        self.row.metadata = metadata;
        self.row.updated_at = Utc::now();
        self.stage_row_update();
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent) -> Result<EventRow> {
        let row = event.into_row(Uuid::new_v4(), Utc::now());
        self.staged.push(Staged::Event(row.clone()));
        Ok(row)
    }

    async fn enqueue_item(&mut self, item: NewQueueItem) -> Result<QueueItemRow> {
        let row = item.into_row(Uuid::new_v4(), Utc::now());
        self.staged.push(Staged::Queue(row.clone()));
        Ok(row)
    }

    async fn create_child_execution(&mut self, new: NewExecution) -> Result<ExecutionRow> {
        let row = new.into_row(Uuid::new_v4(), Utc::now());
        self.staged.push(Staged::Child(row.clone()));
        Ok(row)
    }

    async fn schedule_request(&mut self, request: NewRequest) -> Result<ExecutionRequestRow> {
        let row = request.into_row(Uuid::new_v4());
        self.staged.push(Staged::Request(row.clone()));
        Ok(row)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        for staged in self.staged.drain(..) {
            match staged {
                Staged::Execution(row) => {
                    if let Some(existing) = inner.executions.iter_mut().find(|e| e.id == row.id) {
                        *existing = row;
                    }
                }
                Staged::Event(row) => inner.events.push(row),
                Staged::Queue(row) => inner.queue.push(row),
                Staged::Child(row) => inner.executions.push(row),
                Staged::Request(row) => inner.requests.push(row),
            }
        }
        inner.locked.remove(&self.row.id);
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        if !self.committed {
            // Abandoned claim: release the lock, discard staged writes.
            if let Ok(mut inner) = self.inner.lock() {
                inner.locked.remove(&self.row.id);
            }
        }
    }
}
