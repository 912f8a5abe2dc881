//! The engine facade: wires the store, registry, evaluator, and
//! notification hub, and exposes the library-level operations the
//! transport layer (out of scope here) would call.

use miette::Diagnostic;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use crate::canvas::layout::LayoutRequest;
use crate::canvas::model::Canvas;
use crate::canvas::update::{CanvasUpdater, UpdateError, UpdateOutcome};
use crate::execution::context::{CancelContext, ContextBuilder, NoSecrets, Secrets};
use crate::execution::executor::NodeExecutor;
use crate::execution::state::{CancelError, cancel_execution};
use crate::expr::{ExpressionEvaluator, LiteralEvaluator};
use crate::memory::CanvasMemory;
use crate::notify::NoticeHub;
use crate::registry::{CatalogueEntry, Registry, RegistryError};
use crate::store::{
    CanvasRow, EngineStore, EventRow, ExecutionRequestRow, ExecutionRow, NewEvent, NewQueueItem,
    NewRequest, QueueItemRow, StoreError,
};
use crate::types::{DEFAULT_CHANNEL, NodeState, NodeType};

/// Engine-wide settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base URL webhook request URLs are minted under.
    pub base_url: String,
    /// Executor tick interval.
    pub tick_interval: Duration,
    /// Postgres connection string, when the `postgres` backend is used.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            tick_interval: Duration::from_secs(1),
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Load settings from the environment (`.env` honoured via dotenvy):
    /// `LOOMWORK_BASE_URL`, `LOOMWORK_DATABASE_URL`, `LOOMWORK_TICK_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("LOOMWORK_BASE_URL") {
            config.base_url = base_url;
        }
        config.database_url = std::env::var("LOOMWORK_DATABASE_URL").ok();
        if let Some(ms) = std::env::var("LOOMWORK_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.tick_interval = Duration::from_millis(ms);
        }
        config
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    #[diagnostic(code(loomwork::engine::invalid_argument))]
    InvalidArgument(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cancel(#[from] CancelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(code(loomwork::engine::store))]
    Store(#[from] StoreError),
}

/// The assembled engine.
pub struct Engine {
    store: Arc<dyn EngineStore>,
    registry: Arc<Registry>,
    updater: CanvasUpdater,
    executor: NodeExecutor,
    config: EngineConfig,
}

impl Engine {
    /// Assemble with default services: literal expression evaluation, no
    /// secrets backend, tracing-only notices.
    #[must_use]
    pub fn new(store: Arc<dyn EngineStore>, registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self::with_services(
            store,
            registry,
            Arc::new(LiteralEvaluator),
            Arc::new(NoSecrets),
            NoticeHub::tracing_only(),
            config,
        )
    }

    #[must_use]
    pub fn with_services(
        store: Arc<dyn EngineStore>,
        registry: Arc<Registry>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        secrets: Arc<dyn Secrets>,
        hub: NoticeHub,
        config: EngineConfig,
    ) -> Self {
        let contexts = ContextBuilder::new(
            Arc::clone(&store),
            Arc::clone(&evaluator),
            registry.http_client().clone(),
            Arc::clone(&secrets),
            hub.clone(),
            config.base_url.clone(),
        );
        let updater = CanvasUpdater::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            contexts.clone(),
            hub.clone(),
        );
        let executor = NodeExecutor::with_secrets(
            Arc::clone(&store),
            Arc::clone(&registry),
            evaluator,
            hub,
            config.base_url.clone(),
            secrets,
        )
        .with_tick_interval(config.tick_interval);
        Self {
            store,
            registry,
            updater,
            executor,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn executor(&self) -> &NodeExecutor {
        &self.executor
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run the executor loop until `shutdown` flips to `true`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.executor.run(shutdown).await;
    }

    // ── Canvases ──

    pub async fn update_canvas(
        &self,
        organization_id: Uuid,
        canvas_id: Uuid,
        proposed: Canvas,
        layout: Option<&LayoutRequest>,
    ) -> Result<UpdateOutcome, EngineError> {
        Ok(self
            .updater
            .update_canvas(organization_id, canvas_id, proposed, layout)
            .await?)
    }

    pub async fn describe_canvas(&self, canvas_id: Uuid) -> Result<CanvasRow, EngineError> {
        Ok(self.store.get_canvas(canvas_id).await?)
    }

    pub async fn list_canvases(&self, organization_id: Uuid) -> Result<Vec<CanvasRow>, EngineError> {
        Ok(self.store.list_canvases(organization_id).await?)
    }

    pub async fn delete_canvas(&self, canvas_id: Uuid) -> Result<(), EngineError> {
        Ok(self.store.delete_canvas(canvas_id).await?)
    }

    #[must_use]
    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        self.registry.catalogue()
    }

    #[must_use]
    pub fn memory(&self, canvas_id: Uuid) -> CanvasMemory {
        CanvasMemory::new(Arc::clone(&self.store), canvas_id)
    }

    // ── Nodes ──

    /// Inject an external (root) event into a node and queue it. This is
    /// what a trigger invocation or a manual "emit" lands on.
    #[instrument(skip(self, data), fields(canvas = %canvas_id, node = node_id), err)]
    pub async fn emit_node_event(
        &self,
        canvas_id: Uuid,
        node_id: &str,
        data: Value,
    ) -> Result<EventRow, EngineError> {
        let node = self.store.get_node(canvas_id, node_id).await?;
        if node.node_type == NodeType::Widget {
            return Err(EngineError::InvalidArgument(
                "widget nodes cannot receive events".to_string(),
            ));
        }
        let event = self
            .store
            .append_event(NewEvent {
                workflow_id: canvas_id,
                node_id: node_id.to_string(),
                channel: DEFAULT_CHANNEL.to_string(),
                event_type: "event.external".to_string(),
                data,
                execution_id: None,
                root_event_id: None,
            })
            .await?;
        self.store
            .enqueue_item(NewQueueItem {
                workflow_id: canvas_id,
                node_id: node_id.to_string(),
                event_id: event.id,
                root_event_id: event.root_event_id,
            })
            .await?;
        Ok(event)
    }

    /// Pause or resume a node. Paused nodes keep accumulating queue items
    /// but the executor stops turning them into executions until resumed.
    pub async fn set_node_paused(
        &self,
        canvas_id: Uuid,
        node_id: &str,
        paused: bool,
    ) -> Result<(), EngineError> {
        let node = self.store.get_node(canvas_id, node_id).await?;
        let mut metadata = match node.metadata {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if paused {
            metadata.insert("paused".to_string(), Value::Bool(true));
        } else {
            metadata.remove("paused");
        }
        self.store
            .set_node_metadata(canvas_id, node_id, Value::Object(metadata))
            .await?;
        Ok(())
    }

    /// Reset a node out of `error` state after the user fixed it.
    pub async fn resolve_node_error(
        &self,
        canvas_id: Uuid,
        node_id: &str,
    ) -> Result<(), EngineError> {
        self.store
            .set_node_state(canvas_id, node_id, NodeState::Ready, None)
            .await?;
        Ok(())
    }

    pub async fn list_queue_items(
        &self,
        canvas_id: Uuid,
        node_id: &str,
    ) -> Result<Vec<QueueItemRow>, EngineError> {
        Ok(self.store.list_queue_items(canvas_id, node_id).await?)
    }

    pub async fn list_events(
        &self,
        canvas_id: Uuid,
        node_id: &str,
    ) -> Result<Vec<EventRow>, EngineError> {
        Ok(self.store.list_events(canvas_id, node_id).await?)
    }

    pub async fn list_executions(
        &self,
        canvas_id: Uuid,
        node_id: &str,
    ) -> Result<Vec<ExecutionRow>, EngineError> {
        Ok(self.store.list_executions(canvas_id, node_id).await?)
    }

    // ── Executions ──

    pub async fn get_execution(&self, id: Uuid) -> Result<ExecutionRow, EngineError> {
        Ok(self.store.get_execution(id).await?)
    }

    pub async fn list_child_executions(
        &self,
        parent_execution_id: Uuid,
    ) -> Result<Vec<ExecutionRow>, EngineError> {
        Ok(self.store.list_child_executions(parent_execution_id).await?)
    }

    /// Deliver a named action to an execution's component on the next
    /// tick.
    pub async fn invoke_execution_action(
        &self,
        execution_id: Uuid,
        action_name: &str,
        parameters: Value,
    ) -> Result<ExecutionRequestRow, EngineError> {
        let execution = self.store.get_execution(execution_id).await?;
        if execution.state.is_terminal() {
            return Err(EngineError::InvalidArgument(format!(
                "execution {execution_id} is already {}",
                execution.state
            )));
        }
        Ok(self
            .store
            .schedule_request(NewRequest {
                execution_id,
                action_name: action_name.to_string(),
                parameters,
                run_at: chrono::Utc::now(),
            })
            .await?)
    }

    /// Cancel a top-level execution; blueprint children are cancelled in
    /// the same store operation. The component `cancel` hooks run after
    /// the records commit, best-effort.
    #[instrument(skip(self), err)]
    pub async fn cancel_execution(
        &self,
        execution_id: Uuid,
        cancelled_by: &str,
    ) -> Result<Vec<ExecutionRow>, EngineError> {
        let cancelled = cancel_execution(self.store.as_ref(), execution_id, cancelled_by).await?;

        for execution in &cancelled {
            let Ok(node) = self
                .store
                .get_node_unscoped(execution.workflow_id, &execution.node_id)
                .await
            else {
                continue;
            };
            if node.node_type != NodeType::Component {
                continue;
            }
            let Ok(component) = self.registry.component(node.node_ref.name()) else {
                continue;
            };
            let mut ctx = CancelContext {
                execution: execution.clone(),
                node,
            };
            if let Err(error) = component.cancel(&mut ctx).await {
                tracing::warn!(execution = %execution.id, %error, "cancel hook failed");
            }
        }
        Ok(cancelled)
    }
}
