//! Execution state-machine operations that run outside the claim path.
//!
//! Transitions on the claim path (`pending → started → finished`) are
//! applied through [`crate::store::ExecutionClaim`] by the executor.
//! Cancellation arrives externally and is handled here: it is allowed
//! from `pending` or `started`, recursively covers all non-terminal child
//! executions in one atomic store operation, and may only target a
//! top-level execution; children are cancelled through their parent.

use miette::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

use crate::store::{EngineStore, ExecutionRow, StoreError};

/// Errors raised by cancellation.
#[derive(Debug, Error, Diagnostic)]
pub enum CancelError {
    /// Direct cancellation of a child execution.
    #[error("execution {id} is a child execution; cancel its parent instead")]
    #[diagnostic(code(loomwork::execution::cancel_child))]
    ChildExecution { id: Uuid },

    /// The execution is already terminal.
    #[error("execution {id} is already finished or cancelled")]
    #[diagnostic(code(loomwork::execution::already_terminal))]
    AlreadyTerminal { id: Uuid },

    #[error("execution not found: {id}")]
    #[diagnostic(code(loomwork::execution::not_found))]
    NotFound { id: Uuid },

    #[error(transparent)]
    #[diagnostic(code(loomwork::execution::store))]
    Store(#[from] StoreError),
}

/// Cancel a top-level execution and all of its non-terminal descendants.
///
/// Returns every execution row that was transitioned (the target first).
/// The component `cancel` hook is a separate best-effort notification the
/// caller dispatches after the records are committed.
pub async fn cancel_execution(
    store: &dyn EngineStore,
    id: Uuid,
    cancelled_by: &str,
) -> Result<Vec<ExecutionRow>, CancelError> {
    let execution = store.get_execution(id).await.map_err(|e| match e {
        StoreError::NotFound { .. } => CancelError::NotFound { id },
        other => CancelError::Store(other),
    })?;

    if execution.parent_execution_id.is_some() {
        return Err(CancelError::ChildExecution { id });
    }
    if execution.state.is_terminal() {
        return Err(CancelError::AlreadyTerminal { id });
    }

    let cancelled = store
        .cancel_execution_tree(id, cancelled_by)
        .await
        .map_err(|e| match e {
            StoreError::Conflict { .. } => CancelError::AlreadyTerminal { id },
            other => CancelError::Store(other),
        })?;
    Ok(cancelled)
}
