//! Context assembly for setup, queue processing, and execution.
//!
//! Contexts are the only mutable surface a component sees. The
//! [`ExecutionContext`] *stages* its effects (emissions, failure,
//! deferred action calls, metadata) and the executor applies them
//! through the claim guard so everything commits atomically with the
//! execution's state transition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::canvas::model::Edge;
use crate::component::{ComponentError, Integration};
use crate::expr::ExpressionEvaluator;
use crate::notify::NoticeHub;
use crate::schema::{Field, build_configuration};
use crate::store::{
    CanvasNodeRow, EngineStore, EventRow, ExecutionRow, NewEvent, NewExecution, NewQueueItem,
    QueueItemRow, StoreError,
};
use crate::types::{ExecutionResult, NodeState};
use crate::webhook;

/// Minimum delay accepted by [`ExecutionContext::schedule_action_call`].
pub const MIN_ACTION_DELAY: Duration = Duration::from_secs(1);

/// Secret resolution seam for components.
#[async_trait]
pub trait Secrets: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;
}

/// Resolves nothing; the default when no secret backend is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSecrets;

#[async_trait]
impl Secrets for NoSecrets {
    async fn get(&self, _name: &str) -> Option<String> {
        None
    }
}

// ── Setup ──

/// Context handed to `setup`/`cleanup` during a canvas update.
pub struct SetupContext {
    pub workflow_id: Uuid,
    pub organization_id: Uuid,
    pub node: CanvasNodeRow,
    pub base_url: String,
    store: Arc<dyn EngineStore>,
    http: reqwest::Client,
    secrets: Arc<dyn Secrets>,
}

impl SetupContext {
    #[must_use]
    pub fn configuration(&self) -> &Map<String, Value> {
        &self.node.configuration
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn secret(&self, name: &str) -> Option<String> {
        self.secrets.get(name).await
    }

    /// Persist node-scoped metadata (e.g. a provisioned webhook ID).
    pub async fn set_node_metadata(&self, metadata: Value) -> Result<(), ComponentError> {
        self.store
            .set_node_metadata(self.workflow_id, &self.node.node_id, metadata)
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn events_url(&self, installation_id: &str) -> String {
        webhook::events_url(&self.base_url, installation_id)
    }

    #[must_use]
    pub fn interactions_url(&self, installation_id: &str) -> String {
        webhook::interactions_url(&self.base_url, installation_id)
    }
}

// ── Queue processing ──

/// Context for `process_queue_item`: one queued event on one node.
pub struct ProcessQueueContext {
    pub node: CanvasNodeRow,
    pub item: QueueItemRow,
    pub event: EventRow,
    fields: Vec<Field>,
    edges: Vec<Edge>,
    store: Arc<dyn EngineStore>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl ProcessQueueContext {
    /// The input event's payload.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.event.data
    }

    /// The environment an expression would be evaluated against.
    #[must_use]
    pub fn expression_env(&self, _expr: &str) -> Map<String, Value> {
        let mut env = Map::new();
        env.insert("data".into(), self.event.data.clone());
        env.insert("metadata".into(), self.node.metadata.clone());
        env.insert(
            "node".into(),
            json!({ "id": self.node.node_id, "name": self.node.name }),
        );
        env
    }

    /// Create a pending execution for this queue item.
    ///
    /// The *built* configuration (expressions evaluated, values decoded
    /// and validated) is snapshotted onto the row so later replays are
    /// hermetic. The previous execution is the upstream one that emitted
    /// the input event; its `parent_execution_id` carries over, which is
    /// how deeply-nested blueprint chains keep one logical parent.
    pub async fn create_execution(&self) -> Result<ExecutionRow, ComponentError> {
        let env = self.expression_env("");
        let configuration = build_configuration(
            &self.fields,
            &self.node.configuration,
            self.evaluator.as_ref(),
            &env,
        )?;

        let previous = match self.event.execution_id {
            Some(id) => self.store.get_execution(id).await.ok(),
            None => None,
        };
        let parent_execution_id = previous.as_ref().and_then(|p| p.parent_execution_id);

        let row = self
            .store
            .create_execution(NewExecution {
                workflow_id: self.node.workflow_id,
                node_id: self.node.node_id.clone(),
                root_event_id: self.item.root_event_id,
                event_id: self.item.event_id,
                previous_execution_id: previous.map(|p| p.id),
                parent_execution_id,
                configuration,
                metadata: json!({}),
            })
            .await?;
        Ok(row)
    }

    pub async fn dequeue(&self) -> Result<(), ComponentError> {
        self.store.dequeue_item(self.item.id).await?;
        Ok(())
    }

    pub async fn set_node_state(
        &self,
        state: NodeState,
        reason: Option<String>,
    ) -> Result<(), ComponentError> {
        self.store
            .set_node_state(self.node.workflow_id, &self.node.node_id, state, reason)
            .await?;
        Ok(())
    }

    /// Distinct upstream sources feeding this node.
    ///
    /// For a blueprint-internal node, outer canvas edges are ignored and
    /// only sources within the same blueprint count.
    #[must_use]
    pub fn count_distinct_incoming_sources(&self) -> usize {
        let mut sources: FxHashSet<&str> = FxHashSet::default();
        match &self.node.parent_node_id {
            Some(parent) => {
                let prefix = format!("{parent}:");
                for edge in &self.edges {
                    if edge.target_id == self.node.node_id && edge.source_id.starts_with(&prefix) {
                        sources.insert(edge.source_id.as_str());
                    }
                }
            }
            None => {
                for edge in &self.edges {
                    if edge.target_id == self.node.node_id {
                        sources.insert(edge.source_id.as_str());
                    }
                }
            }
        }
        sources.len()
    }

    /// Prior executions of this node, keyed by their input event.
    pub async fn prior_executions(&self) -> Result<FxHashMap<Uuid, ExecutionRow>, ComponentError> {
        let rows = self
            .store
            .list_executions(self.node.workflow_id, &self.node.node_id)
            .await?;
        Ok(rows.into_iter().map(|r| (r.event_id, r)).collect())
    }
}

// ── Execution ──

pub(crate) struct Emission {
    pub channel: String,
    pub event_type: String,
    pub payloads: Vec<Value>,
}

pub(crate) struct StagedActionCall {
    pub name: String,
    pub parameters: Value,
    pub delay: Duration,
}

/// Effects staged on an [`ExecutionContext`], applied by the executor.
#[derive(Default)]
pub(crate) struct StagedEffects {
    pub emissions: Vec<Emission>,
    pub failure: Option<(ExecutionResult, String)>,
    pub action_calls: Vec<StagedActionCall>,
    pub metadata: Option<Value>,
    pub node_metadata: Option<Value>,
}

/// Context handed to `execute` and (wrapped) to `handle_action`.
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub organization_id: Uuid,
    pub node_id: String,
    /// The node whose emission produced this execution's input event;
    /// `None` when the input was a root (external) event.
    pub source_node_id: Option<String>,
    pub base_url: String,
    execution: ExecutionRow,
    node_metadata: Value,
    data: Value,
    http: reqwest::Client,
    store: Arc<dyn EngineStore>,
    secrets: Arc<dyn Secrets>,
    hub: NoticeHub,
    integration: Option<Arc<dyn Integration>>,
    effects: StagedEffects,
    finished: bool,
}

impl ExecutionContext {
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution.id
    }

    /// The configuration snapshot taken at execution creation.
    #[must_use]
    pub fn configuration(&self) -> &Map<String, Value> {
        &self.execution.configuration
    }

    /// The input event's payload.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The shared outbound HTTP client.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Execution-scoped metadata (reflects staged writes).
    #[must_use]
    pub fn metadata(&self) -> &Value {
        self.effects
            .metadata
            .as_ref()
            .unwrap_or(&self.execution.metadata)
    }

    pub fn set_metadata(&mut self, metadata: Value) {
        self.effects.metadata = Some(metadata);
    }

    /// Node-scoped metadata (reflects staged writes).
    #[must_use]
    pub fn node_metadata(&self) -> &Value {
        self.effects
            .node_metadata
            .as_ref()
            .unwrap_or(&self.node_metadata)
    }

    pub fn set_node_metadata(&mut self, metadata: Value) {
        self.effects.node_metadata = Some(metadata);
    }

    /// Emit payloads on an output channel.
    ///
    /// Emissions after the execution reached a terminal state are dropped;
    /// late action handlers are required to be effect-free.
    pub fn emit(
        &mut self,
        channel: impl Into<String>,
        event_type: impl Into<String>,
        payloads: Vec<Value>,
    ) {
        if self.is_finished() {
            return;
        }
        self.effects.emissions.push(Emission {
            channel: channel.into(),
            event_type: event_type.into(),
            payloads,
        });
    }

    /// Terminate this execution with `result = error|failed`.
    ///
    /// Any other result is recorded as `error`.
    pub fn fail(&mut self, result: ExecutionResult, message: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        let result = match result {
            ExecutionResult::Failed => ExecutionResult::Failed,
            _ => ExecutionResult::Error,
        };
        self.effects.failure = Some((result, message.into()));
    }

    /// True once the execution reached (or staged) a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished || self.effects.failure.is_some()
    }

    /// Schedule a deferred action call, delivered back to this component
    /// through `handle_action` after `delay`.
    pub fn schedule_action_call(
        &mut self,
        name: impl Into<String>,
        parameters: Value,
        delay: Duration,
    ) -> Result<(), ComponentError> {
        if delay < MIN_ACTION_DELAY {
            return Err(ComponentError::Configuration(format!(
                "action call delay must be at least {MIN_ACTION_DELAY:?}"
            )));
        }
        self.effects.action_calls.push(StagedActionCall {
            name: name.into(),
            parameters,
            delay,
        });
        Ok(())
    }

    /// Append to the canvas's namespaced memory. Both arguments are
    /// required; memory is append-only.
    pub async fn memory_add(
        &self,
        namespace: &str,
        values: Value,
    ) -> Result<(), ComponentError> {
        if namespace.is_empty() {
            return Err(ComponentError::Configuration(
                "memory namespace is required".into(),
            ));
        }
        if values.is_null() {
            return Err(ComponentError::Configuration(
                "memory values are required".into(),
            ));
        }
        self.store
            .memory_add(self.workflow_id, namespace, values)
            .await?;
        Ok(())
    }

    pub async fn secret(&self, name: &str) -> Option<String> {
        self.secrets.get(name).await
    }

    /// Publish a fire-and-forget notification.
    pub fn notify(&self, kind: impl Into<String>, payload: Value) {
        self.hub.publish(kind, payload);
    }

    /// The integration bound to this node, when it has an installation.
    #[must_use]
    pub fn integration(&self) -> Option<&Arc<dyn Integration>> {
        self.integration.as_ref()
    }

    #[must_use]
    pub fn events_url(&self, installation_id: &str) -> String {
        webhook::events_url(&self.base_url, installation_id)
    }

    #[must_use]
    pub fn interactions_url(&self, installation_id: &str) -> String {
        webhook::interactions_url(&self.base_url, installation_id)
    }

    /// The environment an expression would be evaluated against.
    #[must_use]
    pub fn expression_env(&self, _expr: &str) -> Map<String, Value> {
        let mut env = Map::new();
        env.insert("data".into(), self.data.clone());
        env.insert("metadata".into(), self.metadata().clone());
        env.insert(
            "configuration".into(),
            Value::Object(self.execution.configuration.clone()),
        );
        env
    }

    pub(crate) fn take_effects(&mut self) -> StagedEffects {
        std::mem::take(&mut self.effects)
    }
}

/// [`ExecutionContext`] plus the action being delivered.
pub struct ActionContext {
    pub action_name: String,
    pub parameters: Value,
    inner: ExecutionContext,
}

impl ActionContext {
    pub(crate) fn new(action_name: String, parameters: Value, inner: ExecutionContext) -> Self {
        Self {
            action_name,
            parameters,
            inner,
        }
    }

    pub(crate) fn into_inner(self) -> ExecutionContext {
        self.inner
    }
}

impl std::ops::Deref for ActionContext {
    type Target = ExecutionContext;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::ops::DerefMut for ActionContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Best-effort cancellation notification.
pub struct CancelContext {
    pub execution: ExecutionRow,
    pub node: CanvasNodeRow,
}

/// Inbound webhook traffic for a node bound to an integration.
pub struct WebhookContext {
    pub node: CanvasNodeRow,
    pub headers: FxHashMap<String, String>,
    pub body: Vec<u8>,
    store: Arc<dyn EngineStore>,
}

impl WebhookContext {
    /// Ingest an external payload as a root event on this node and queue
    /// it for processing.
    pub async fn ingest_event(&self, data: Value) -> Result<EventRow, ComponentError> {
        let event = self
            .store
            .append_event(NewEvent {
                workflow_id: self.node.workflow_id,
                node_id: self.node.node_id.clone(),
                channel: crate::types::DEFAULT_CHANNEL.to_string(),
                event_type: "webhook.received".to_string(),
                data,
                execution_id: None,
                root_event_id: None,
            })
            .await?;
        self.store
            .enqueue_item(NewQueueItem {
                workflow_id: self.node.workflow_id,
                node_id: self.node.node_id.clone(),
                event_id: event.id,
                root_event_id: event.root_event_id,
            })
            .await?;
        Ok(event)
    }
}

// ── Builder ──

/// Assembles contexts from store rows and shared services.
#[derive(Clone)]
pub struct ContextBuilder {
    store: Arc<dyn EngineStore>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    http: reqwest::Client,
    secrets: Arc<dyn Secrets>,
    hub: NoticeHub,
    base_url: String,
}

impl ContextBuilder {
    #[must_use]
    pub fn new(
        store: Arc<dyn EngineStore>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        http: reqwest::Client,
        secrets: Arc<dyn Secrets>,
        hub: NoticeHub,
        base_url: String,
    ) -> Self {
        Self {
            store,
            evaluator,
            http,
            secrets,
            hub,
            base_url,
        }
    }

    #[must_use]
    pub fn setup_context(&self, organization_id: Uuid, node: CanvasNodeRow) -> SetupContext {
        SetupContext {
            workflow_id: node.workflow_id,
            organization_id,
            node,
            base_url: self.base_url.clone(),
            store: Arc::clone(&self.store),
            http: self.http.clone(),
            secrets: Arc::clone(&self.secrets),
        }
    }

    /// Assemble the queue-processing context for one item.
    pub async fn process_queue_context(
        &self,
        node: CanvasNodeRow,
        item: QueueItemRow,
        fields: Vec<Field>,
        edges: Vec<Edge>,
    ) -> Result<ProcessQueueContext, StoreError> {
        let event = self.store.get_event(item.event_id).await?;
        Ok(ProcessQueueContext {
            node,
            item,
            event,
            fields,
            edges,
            store: Arc::clone(&self.store),
            evaluator: Arc::clone(&self.evaluator),
        })
    }

    /// Assemble the full execution context for a claimed execution.
    pub async fn execution_context(
        &self,
        organization_id: Uuid,
        execution: ExecutionRow,
        node: CanvasNodeRow,
        integration: Option<Arc<dyn Integration>>,
    ) -> Result<ExecutionContext, StoreError> {
        let event = self.store.get_event(execution.event_id).await?;
        let source_node_id =
            (event.node_id != execution.node_id).then(|| event.node_id.clone());
        let finished = execution.state.is_terminal();
        Ok(ExecutionContext {
            workflow_id: execution.workflow_id,
            organization_id,
            node_id: execution.node_id.clone(),
            source_node_id,
            base_url: self.base_url.clone(),
            node_metadata: node.metadata.clone(),
            data: event.data,
            http: self.http.clone(),
            store: Arc::clone(&self.store),
            secrets: Arc::clone(&self.secrets),
            hub: self.hub.clone(),
            integration,
            effects: StagedEffects::default(),
            finished,
            execution,
        })
    }

    #[must_use]
    pub fn webhook_context(
        &self,
        node: CanvasNodeRow,
        headers: FxHashMap<String, String>,
        body: Vec<u8>,
    ) -> WebhookContext {
        WebhookContext {
            node,
            headers,
            body,
            store: Arc::clone(&self.store),
        }
    }

    pub(crate) fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }
}
