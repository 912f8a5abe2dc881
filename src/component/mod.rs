//! The component contract: what a pluggable node implementation declares
//! and what it may do while executing.
//!
//! A component is stateless; all mutable state lives in the contexts it is
//! handed ([`ExecutionContext`] and friends). The engine resolves
//! components by name; the name is the sole stable identifier across
//! canvas versions.
//!
//! Three hook groups matter:
//!
//! - **Lifecycle**: `setup` runs on canvas update (failure puts the node
//!   in `error` state), `cleanup` on removal.
//! - **Runtime**: `process_queue_item` turns a queued event into a pending
//!   execution (the default implementation creates the execution, dequeues
//!   the item, and marks the node `processing`); `execute` runs the
//!   component; `handle_action` receives deferred action calls scheduled
//!   via [`ExecutionContext::schedule_action_call`]. Handlers MUST return
//!   without effect when `is_finished()`, since a late action may arrive after
//!   cancellation.
//! - **External**: `handle_webhook` for inbound integration traffic,
//!   `cancel` as a best-effort notification on cancellation.

pub mod http;
pub mod noop;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::execution::context::{
    ActionContext, CancelContext, ExecutionContext, ProcessQueueContext, SetupContext,
    WebhookContext,
};
use crate::expr::ExprError;
use crate::schema::{Field, SchemaError};
use crate::store::StoreError;
use crate::types::{DEFAULT_CHANNEL, NodeState};

pub use http::HttpComponent;
pub use noop::NoopComponent;

/// Errors a component hook may surface.
#[derive(Debug, Error, Diagnostic)]
pub enum ComponentError {
    /// The node's configuration is unusable.
    #[error("configuration error: {0}")]
    #[diagnostic(code(loomwork::component::configuration))]
    Configuration(String),

    /// The hook failed; the execution (or setup) records this message.
    #[error("{0}")]
    #[diagnostic(code(loomwork::component::failed))]
    Failed(String),

    /// An outbound request exceeded its per-attempt deadline.
    #[error("request timed out after {0:?}")]
    #[diagnostic(code(loomwork::component::timeout))]
    Timeout(std::time::Duration),

    #[error(transparent)]
    #[diagnostic(code(loomwork::component::http))]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    #[diagnostic(code(loomwork::component::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(loomwork::component::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(loomwork::component::schema))]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(code(loomwork::component::expr))]
    Expr(#[from] ExprError),
}

/// A named action a component accepts through `handle_action`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: String::new(),
        }
    }
}

/// A pluggable workflow component.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    fn label(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn icon(&self) -> &str {
        "puzzle"
    }
    fn color(&self) -> &str {
        "gray"
    }

    /// The declarative configuration schema rendered by the editor.
    fn configuration(&self) -> Vec<Field>;

    /// Output channels for the given configuration. Most components emit
    /// only on `default`.
    fn output_channels(&self, configuration: &Map<String, Value>) -> Vec<String> {
        let _ = configuration;
        vec![DEFAULT_CHANNEL.to_string()]
    }

    /// Actions deliverable through `handle_action`.
    fn actions(&self) -> Vec<ActionSpec> {
        Vec::new()
    }

    /// Runs on canvas update inside the update's scope; failure puts the
    /// node in `error` state with this error's message.
    async fn setup(&self, ctx: &mut SetupContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Turn a queued event into a pending execution. Returns the created
    /// execution's ID, if one was created.
    async fn process_queue_item(
        &self,
        ctx: &mut ProcessQueueContext,
    ) -> Result<Option<Uuid>, ComponentError> {
        default_process_queue_item(ctx).await
    }

    /// Run the component for one claimed execution.
    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ComponentError>;

    /// Receive a deferred action call. Must short-circuit when
    /// `ctx.is_finished()`.
    async fn handle_action(&self, ctx: &mut ActionContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Best-effort notification that an execution was cancelled; failures
    /// are logged and never block the cancellation itself.
    async fn cancel(&self, ctx: &mut CancelContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Inbound webhook traffic for nodes bound to an integration.
    async fn handle_webhook(&self, ctx: &mut WebhookContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    /// Runs when the node is removed from a canvas.
    async fn cleanup(&self, ctx: &mut SetupContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }
}

/// The default `process_queue_item`: create the execution, dequeue the
/// item, mark the node `processing`.
pub async fn default_process_queue_item(
    ctx: &mut ProcessQueueContext,
) -> Result<Option<Uuid>, ComponentError> {
    let execution = ctx.create_execution().await?;
    ctx.dequeue().await?;
    ctx.set_node_state(NodeState::Processing, None).await?;
    Ok(Some(execution.id))
}

/// An event source. Triggers never run `execute`; they feed events into
/// the canvas from the outside (webhooks, schedules).
#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &str;
    fn label(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn configuration(&self) -> Vec<Field>;

    async fn setup(&self, ctx: &mut SetupContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    async fn handle_webhook(&self, ctx: &mut WebhookContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }

    async fn cleanup(&self, ctx: &mut SetupContext) -> Result<(), ComponentError> {
        let _ = ctx;
        Ok(())
    }
}

/// A reference to an externally-hosted resource, as listed by an
/// integration for `Resource`-typed configuration fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
    pub kind: String,
}

/// An installed third-party integration.
///
/// Only the contract is defined here; concrete wire protocols live
/// outside the engine. Signed inbound requests are verified per
/// integration; see [`crate::webhook`] for the Slack-shaped scheme.
#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;
    fn label(&self) -> &str;

    /// Verify an inbound signed request.
    fn verify_request(
        &self,
        timestamp: i64,
        body: &[u8],
        signature: &str,
    ) -> Result<(), ComponentError>;

    /// List resources of `kind` for resource-typed fields.
    async fn list_resources(&self, kind: &str) -> Result<Vec<ResourceRef>, ComponentError>;
}
