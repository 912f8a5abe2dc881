//! Append-only, namespaced canvas memory.
//!
//! Components add records; consumers read back by namespace in insertion
//! order. There is no update or delete; memory only grows, which is what
//! makes it safe to write from concurrent executions without coordination.

use miette::Diagnostic;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::store::{EngineStore, MemoryRow, StoreError};

/// Errors raised by canvas-memory operations.
#[derive(Debug, Error, Diagnostic)]
pub enum MemoryError {
    #[error("invalid argument: {0}")]
    #[diagnostic(code(loomwork::memory::invalid_argument))]
    InvalidArgument(&'static str),

    #[error(transparent)]
    #[diagnostic(code(loomwork::memory::store))]
    Store(#[from] StoreError),
}

/// Handle to one canvas's memory log.
#[derive(Clone)]
pub struct CanvasMemory {
    store: Arc<dyn EngineStore>,
    canvas_id: Uuid,
}

impl CanvasMemory {
    #[must_use]
    pub fn new(store: Arc<dyn EngineStore>, canvas_id: Uuid) -> Self {
        Self { store, canvas_id }
    }

    /// Append a record. Both the namespace and the values are required.
    pub async fn add(&self, namespace: &str, values: Value) -> Result<MemoryRow, MemoryError> {
        if namespace.is_empty() {
            return Err(MemoryError::InvalidArgument("namespace is required"));
        }
        if values.is_null() {
            return Err(MemoryError::InvalidArgument("values are required"));
        }
        Ok(self.store.memory_add(self.canvas_id, namespace, values).await?)
    }

    /// All records in a namespace, oldest first.
    pub async fn list(&self, namespace: &str) -> Result<Vec<MemoryRow>, MemoryError> {
        Ok(self.store.memory_list(self.canvas_id, namespace).await?)
    }
}
