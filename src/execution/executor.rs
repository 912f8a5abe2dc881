//! The node executor: the pending-execution scheduler.
//!
//! A single loop ticks at a fixed interval. Each tick drains three queues
//! to quiescence: due action requests (delivered through
//! `handle_action`), node queue items (driven through
//! `process_queue_item`), and pending executions (claimed through the
//! store's single-claim protocol and dispatched to the component or the
//! blueprint path). Draining within one tick means a causal chain (an
//! upstream execution emitting, the event fanning out, the downstream
//! execution running) completes without waiting for the next tick.
//!
//! Concurrency: up to [`WORKER_PERMITS`] claimed executions run at once
//! behind a semaphore. Multiple executor processes may run in parallel;
//! the claim protocol guarantees each execution runs at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tracing::instrument;
use uuid::Uuid;

use crate::canvas::blueprint::{ExpandError, expand_blueprints, root_child_id};
use crate::canvas::model::{Canvas, Edge};
use crate::component::Integration;
use crate::component::default_process_queue_item;
use crate::execution::context::{
    ActionContext, ContextBuilder, NoSecrets, Secrets, StagedEffects,
};
use crate::expr::ExpressionEvaluator;
use crate::notify::NoticeHub;
use crate::registry::Registry;
use crate::schema::{Field, build_configuration};
use crate::store::{
    CanvasNodeRow, EngineStore, ExecutionClaim, ExecutionRow, NewEvent, NewExecution,
    NewQueueItem, NewRequest, QueueItemRow, StoreError,
};
use crate::types::{ExecutionResult, NodeState, NodeType};

/// Concurrent task capacity per executor process.
pub const WORKER_PERMITS: usize = 25;

/// Default tick interval.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const BATCH_LIMIT: usize = 100;
const MAX_DRAIN_PASSES: usize = 32;

/// Errors surfaced by the executor loop itself.
///
/// Per-execution failures never show up here; they are recorded on the
/// execution row and the worker reports success (the work is done).
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error(transparent)]
    #[diagnostic(code(loomwork::executor::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(loomwork::executor::expand))]
    Expand(#[from] ExpandError),

    #[error("worker task join error: {0}")]
    #[diagnostic(code(loomwork::executor::join))]
    Join(#[from] tokio::task::JoinError),
}

/// What one tick accomplished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub requests_delivered: usize,
    pub items_processed: usize,
    pub executions_run: usize,
}

impl TickReport {
    fn total(&self) -> usize {
        self.requests_delivered + self.items_processed + self.executions_run
    }

    fn add(&mut self, other: TickReport) {
        self.requests_delivered += other.requests_delivered;
        self.items_processed += other.items_processed;
        self.executions_run += other.executions_run;
    }
}

struct Inner {
    store: Arc<dyn EngineStore>,
    registry: Arc<Registry>,
    contexts: ContextBuilder,
    permits: Arc<Semaphore>,
    tick_interval: Duration,
}

/// The pending-execution scheduler. Cheap to clone; all clones share one
/// semaphore.
#[derive(Clone)]
pub struct NodeExecutor {
    inner: Arc<Inner>,
}

impl NodeExecutor {
    #[must_use]
    pub fn new(
        store: Arc<dyn EngineStore>,
        registry: Arc<Registry>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        hub: NoticeHub,
        base_url: String,
    ) -> Self {
        Self::with_secrets(store, registry, evaluator, hub, base_url, Arc::new(NoSecrets))
    }

    #[must_use]
    pub fn with_secrets(
        store: Arc<dyn EngineStore>,
        registry: Arc<Registry>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        hub: NoticeHub,
        base_url: String,
        secrets: Arc<dyn Secrets>,
    ) -> Self {
        let contexts = ContextBuilder::new(
            Arc::clone(&store),
            evaluator,
            registry.http_client().clone(),
            secrets,
            hub,
            base_url,
        );
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                contexts,
                permits: Arc::new(Semaphore::new(WORKER_PERMITS)),
                tick_interval: TICK_INTERVAL,
            }),
        }
    }

    /// Override the tick interval (tests, embedded setups).
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        let inner = Arc::get_mut(&mut self.inner);
        match inner {
            Some(inner) => inner.tick_interval = interval,
            None => {
                tracing::warn!("executor already shared; tick interval unchanged");
            }
        }
        self
    }

    /// Run the tick loop until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.inner.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(error) = self.tick().await {
                        tracing::error!(%error, "executor tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("executor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one tick, draining requests, queue items, and pending
    /// executions until nothing makes progress.
    #[instrument(skip(self), err)]
    pub async fn tick(&self) -> Result<TickReport, ExecutorError> {
        let mut report = TickReport::default();
        for _ in 0..MAX_DRAIN_PASSES {
            let mut pass = TickReport::default();
            pass.requests_delivered = self.deliver_due_requests().await?;
            pass.items_processed = self.process_queue_items().await?;
            pass.executions_run = self.run_pending_executions().await?;
            if pass.total() == 0 {
                break;
            }
            report.add(pass);
        }
        Ok(report)
    }

    // ── Deferred action requests ──

    async fn deliver_due_requests(&self) -> Result<usize, ExecutorError> {
        let due = self
            .inner
            .store
            .due_requests(Utc::now(), BATCH_LIMIT)
            .await?;
        let mut delivered = 0;
        for request in due {
            if let Err(error) = deliver_request(&self.inner, &request).await {
                tracing::warn!(request = %request.id, %error, "action delivery failed");
            } else {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    // ── Queue items ──

    async fn process_queue_items(&self) -> Result<usize, ExecutorError> {
        let items = self.inner.store.pending_queue_items(BATCH_LIMIT).await?;
        let mut edges_cache: FxHashMap<Uuid, Vec<Edge>> = FxHashMap::default();
        let mut processed = 0;
        for item in items {
            match process_queue_item(&self.inner, &item, &mut edges_cache).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(item = %item.id, %error, "queue item processing failed");
                }
            }
        }
        Ok(processed)
    }

    // ── Pending executions ──

    async fn run_pending_executions(&self) -> Result<usize, ExecutorError> {
        let pending = self.inner.store.list_pending_executions(BATCH_LIMIT).await?;
        let mut handles = Vec::with_capacity(pending.len());
        for execution in pending {
            let permit = Arc::clone(&self.inner.permits)
                .acquire_owned()
                .await
                .expect("executor semaphore closed");
            let inner = Arc::clone(&self.inner);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                process_execution(&inner, execution.id).await
            }));
        }

        let mut ran = 0;
        for joined in join_all(handles).await {
            match joined? {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(error) => {
                    // Worker-level failure: the claim rolled back, the
                    // execution is still pending, the next tick retries.
                    tracing::error!(%error, "execution worker failed");
                }
            }
        }
        Ok(ran)
    }
}

/// The runtime edge list of a canvas: blueprint nodes expanded, terminal
/// internal emissions surfaced to outer targets.
fn runtime_edges(registry: &Registry, canvas: &Canvas) -> Result<Vec<Edge>, ExpandError> {
    let resolve = |name: &str| registry.blueprint(name).ok();
    let expansion = expand_blueprints(&canvas.nodes, &canvas.edges, &resolve)?;
    Ok(expansion.edges)
}

fn configuration_fields(registry: &Registry, node: &CanvasNodeRow) -> Vec<Field> {
    match node.node_type {
        NodeType::Component => registry
            .component(node.node_ref.name())
            .map(|c| c.configuration())
            .unwrap_or_default(),
        NodeType::Trigger => registry
            .trigger(node.node_ref.name())
            .map(|t| t.configuration())
            .unwrap_or_default(),
        NodeType::Blueprint => registry
            .blueprint(node.node_ref.name())
            .map(|b| b.configuration)
            .unwrap_or_default(),
        NodeType::Widget => Vec::new(),
    }
}

fn resolve_integration(
    registry: &Registry,
    node: &CanvasNodeRow,
    fields: &[Field],
) -> Option<Arc<dyn Integration>> {
    node.app_installation_id.as_ref()?;
    let name = fields
        .iter()
        .find_map(|f| f.type_options.integration.as_deref())?;
    registry.integration(name).ok()
}

async fn process_queue_item(
    inner: &Inner,
    item: &QueueItemRow,
    edges_cache: &mut FxHashMap<Uuid, Vec<Edge>>,
) -> Result<bool, ExecutorError> {
    let node = match inner.store.get_node(item.workflow_id, &item.node_id).await {
        Ok(node) => node,
        Err(StoreError::NotFound { .. }) => {
            // Node was removed after the event landed; drop the item.
            inner.store.dequeue_item(item.id).await?;
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    if node.state == NodeState::Error {
        // Leave the item queued; it runs once the node is fixed.
        return Ok(false);
    }
    if node
        .metadata
        .get("paused")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
    {
        // Paused nodes accumulate items until resumed.
        return Ok(false);
    }

    let edges = match edges_cache.get(&item.workflow_id) {
        Some(edges) => edges.clone(),
        None => {
            let canvas = inner.store.get_canvas(item.workflow_id).await?;
            let edges = runtime_edges(&inner.registry, &canvas.canvas)?;
            edges_cache.insert(item.workflow_id, edges.clone());
            edges
        }
    };

    let fields = configuration_fields(&inner.registry, &node);
    let node_type = node.node_type;
    let ref_name = node.node_ref.name().to_string();
    let mut ctx = inner
        .contexts
        .process_queue_context(node, item.clone(), fields, edges)
        .await?;

    let outcome = match node_type {
        NodeType::Component => match inner.registry.component(&ref_name) {
            Ok(component) => component.process_queue_item(&mut ctx).await,
            Err(error) => {
                ctx.set_node_state(NodeState::Error, Some(error.to_string()))
                    .await
                    .map_err(|e| StoreError::Backend {
                        message: e.to_string(),
                    })?;
                return Ok(false);
            }
        },
        _ => default_process_queue_item(&mut ctx).await,
    };

    match outcome {
        Ok(_execution_id) => Ok(true),
        Err(error) => {
            tracing::warn!(node = %ref_name, %error, "process_queue_item failed");
            Ok(false)
        }
    }
}

/// Claim and run one pending execution. `Ok(false)` means the claim was
/// lost (benign) or nothing ran.
async fn process_execution(inner: &Inner, id: Uuid) -> Result<bool, ExecutorError> {
    let mut claim = match inner.store.lock_pending_execution(id).await {
        Ok(claim) => claim,
        // Another worker holds or already processed it; skip silently.
        Err(StoreError::RecordLocked) | Err(StoreError::NotFound { .. }) => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let execution = claim.execution().clone();
    let node = inner
        .store
        .get_node_unscoped(execution.workflow_id, &execution.node_id)
        .await?;
    let canvas = inner.store.get_canvas(execution.workflow_id).await?.canvas;
    let organization_id = canvas.organization_id;
    let edges = runtime_edges(&inner.registry, &canvas)?;

    match node.node_type {
        NodeType::Blueprint => {
            dispatch_blueprint(inner, claim, &execution, &node).await?;
        }
        NodeType::Component => {
            claim.mark_started().await?;
            let component = match inner.registry.component(node.node_ref.name()) {
                Ok(component) => component,
                Err(error) => {
                    claim.finish(ExecutionResult::Error, Some(error.to_string())).await?;
                    claim.commit().await?;
                    return Ok(true);
                }
            };
            let fields = component.configuration();
            let integration = resolve_integration(&inner.registry, &node, &fields);
            let mut ctx = inner
                .contexts
                .execution_context(organization_id, execution.clone(), node.clone(), integration)
                .await?;

            match component.execute(&mut ctx).await {
                Ok(()) => {
                    let effects = ctx.take_effects();
                    apply_effects_to_claim(inner, claim, &execution, &node, &edges, effects)
                        .await?;
                }
                Err(error) => {
                    // Anything the component staged is discarded with the
                    // failed attempt.
                    claim.finish(ExecutionResult::Error, Some(error.to_string())).await?;
                    claim.commit().await?;
                    reset_node_state(inner, &node).await;
                }
            }
        }
        NodeType::Trigger => {
            // Triggers run no component; the input event fans out as-is.
            claim.mark_started().await?;
            let event = inner.store.get_event(execution.event_id).await?;
            let mut effects = StagedEffects::default();
            effects.emissions.push(crate::execution::context::Emission {
                channel: crate::types::DEFAULT_CHANNEL.to_string(),
                event_type: "trigger.fired".to_string(),
                payloads: vec![event.data],
            });
            apply_effects_to_claim(inner, claim, &execution, &node, &edges, effects).await?;
        }
        NodeType::Widget => {
            claim.mark_started().await?;
            claim
                .finish(
                    ExecutionResult::Error,
                    Some("widget nodes are not executable".to_string()),
                )
                .await?;
            claim.commit().await?;
        }
    }

    Ok(true)
}

async fn dispatch_blueprint(
    inner: &Inner,
    mut claim: Box<dyn ExecutionClaim>,
    execution: &ExecutionRow,
    node: &CanvasNodeRow,
) -> Result<(), ExecutorError> {
    claim.mark_started().await?;

    let blueprint = match inner.registry.blueprint(node.node_ref.name()) {
        Ok(blueprint) => blueprint,
        Err(error) => {
            claim.finish(ExecutionResult::Error, Some(error.to_string())).await?;
            claim.commit().await?;
            return Ok(());
        }
    };
    let root_id = match root_child_id(&node.node_id, &blueprint) {
        Ok(root_id) => root_id,
        Err(error) => {
            claim.finish(ExecutionResult::Error, Some(error.to_string())).await?;
            claim.commit().await?;
            return Ok(());
        }
    };

    let child_node = inner
        .store
        .get_node_unscoped(execution.workflow_id, &root_id)
        .await?;
    let event = inner.store.get_event(execution.event_id).await?;
    let fields = configuration_fields(&inner.registry, &child_node);
    let mut env = serde_json::Map::new();
    env.insert("data".into(), event.data.clone());
    env.insert("metadata".into(), child_node.metadata.clone());

    // A broken child configuration is this execution's failure, not the
    // worker's.
    let configuration = match build_configuration(
        &fields,
        &child_node.configuration,
        inner.contexts_evaluator(),
        &env,
    ) {
        Ok(configuration) => configuration,
        Err(error) => {
            claim.finish(ExecutionResult::Error, Some(error.to_string())).await?;
            claim.commit().await?;
            return Ok(());
        }
    };

    claim
        .create_child_execution(NewExecution {
            workflow_id: execution.workflow_id,
            node_id: root_id,
            root_event_id: execution.root_event_id,
            event_id: execution.event_id,
            previous_execution_id: Some(execution.id),
            parent_execution_id: Some(execution.id),
            configuration,
            metadata: json!({}),
        })
        .await?;
    claim.commit().await?;
    Ok(())
}

impl Inner {
    fn contexts_evaluator(&self) -> &dyn ExpressionEvaluator {
        self.contexts.evaluator()
    }
}

/// Apply staged effects through the claim: metadata, events with their
/// downstream fan-out, scheduled requests, and the terminal transition in
/// one atomic commit.
async fn apply_effects_to_claim(
    inner: &Inner,
    mut claim: Box<dyn ExecutionClaim>,
    execution: &ExecutionRow,
    node: &CanvasNodeRow,
    edges: &[Edge],
    effects: StagedEffects,
) -> Result<(), ExecutorError> {
    if let Some(metadata) = &effects.metadata {
        claim.set_metadata(metadata.clone()).await?;
    }

    for emission in &effects.emissions {
        for payload in &emission.payloads {
            let event = claim
                .append_event(NewEvent {
                    workflow_id: execution.workflow_id,
                    node_id: execution.node_id.clone(),
                    channel: emission.channel.clone(),
                    event_type: emission.event_type.clone(),
                    data: payload.clone(),
                    execution_id: Some(execution.id),
                    root_event_id: Some(execution.root_event_id),
                })
                .await?;
            for edge in edges
                .iter()
                .filter(|e| e.source_id == execution.node_id && e.channel == emission.channel)
            {
                claim
                    .enqueue_item(NewQueueItem {
                        workflow_id: execution.workflow_id,
                        node_id: edge.target_id.clone(),
                        event_id: event.id,
                        root_event_id: execution.root_event_id,
                    })
                    .await?;
            }
        }
    }

    let has_deferred = !effects.action_calls.is_empty();
    for call in effects.action_calls {
        let delay = chrono::Duration::from_std(call.delay).unwrap_or(chrono::Duration::seconds(1));
        claim
            .schedule_request(NewRequest {
                execution_id: execution.id,
                action_name: call.name,
                parameters: call.parameters,
                run_at: Utc::now() + delay,
            })
            .await?;
    }

    let finished = match effects.failure {
        Some((result, message)) => {
            claim.finish(result, Some(message)).await?;
            true
        }
        None if has_deferred => false,
        None => {
            claim.finish(ExecutionResult::Passed, None).await?;
            true
        }
    };
    claim.commit().await?;

    if let Some(metadata) = effects.node_metadata {
        if let Err(error) = inner
            .store
            .set_node_metadata(node.workflow_id, &node.node_id, metadata)
            .await
        {
            tracing::warn!(node = %node.node_id, %error, "node metadata update failed");
        }
    }

    if finished {
        reset_node_state(inner, node).await;
        finish_parent_if_terminal(inner, execution, node, edges).await;
    }
    Ok(())
}

/// Apply staged effects with plain store operations: the action-delivery
/// path, where the execution is already `started` and no claim exists.
async fn apply_effects_to_store(
    inner: &Inner,
    execution: &ExecutionRow,
    node: &CanvasNodeRow,
    edges: &[Edge],
    effects: StagedEffects,
) -> Result<(), ExecutorError> {
    if let Some(metadata) = &effects.metadata {
        inner
            .store
            .set_execution_metadata(execution.id, metadata.clone())
            .await?;
    }

    for emission in &effects.emissions {
        for payload in &emission.payloads {
            let event = inner
                .store
                .append_event(NewEvent {
                    workflow_id: execution.workflow_id,
                    node_id: execution.node_id.clone(),
                    channel: emission.channel.clone(),
                    event_type: emission.event_type.clone(),
                    data: payload.clone(),
                    execution_id: Some(execution.id),
                    root_event_id: Some(execution.root_event_id),
                })
                .await?;
            for edge in edges
                .iter()
                .filter(|e| e.source_id == execution.node_id && e.channel == emission.channel)
            {
                inner
                    .store
                    .enqueue_item(NewQueueItem {
                        workflow_id: execution.workflow_id,
                        node_id: edge.target_id.clone(),
                        event_id: event.id,
                        root_event_id: execution.root_event_id,
                    })
                    .await?;
            }
        }
    }

    let has_deferred = !effects.action_calls.is_empty();
    for call in effects.action_calls {
        let delay = chrono::Duration::from_std(call.delay).unwrap_or(chrono::Duration::seconds(1));
        inner
            .store
            .schedule_request(NewRequest {
                execution_id: execution.id,
                action_name: call.name,
                parameters: call.parameters,
                run_at: Utc::now() + delay,
            })
            .await?;
    }

    let finished = match effects.failure {
        Some((result, message)) => {
            inner
                .store
                .finish_execution(execution.id, result, Some(message))
                .await?;
            true
        }
        None if has_deferred => false,
        None => {
            inner
                .store
                .finish_execution(execution.id, ExecutionResult::Passed, None)
                .await?;
            true
        }
    };

    if let Some(metadata) = effects.node_metadata {
        if let Err(error) = inner
            .store
            .set_node_metadata(node.workflow_id, &node.node_id, metadata)
            .await
        {
            tracing::warn!(node = %node.node_id, %error, "node metadata update failed");
        }
    }

    if finished {
        reset_node_state(inner, node).await;
        finish_parent_if_terminal(inner, execution, node, edges).await;
    }
    Ok(())
}

async fn deliver_request(
    inner: &Inner,
    request: &crate::store::ExecutionRequestRow,
) -> Result<(), ExecutorError> {
    let execution = match inner.store.get_execution(request.execution_id).await {
        Ok(execution) => execution,
        Err(StoreError::NotFound { .. }) => {
            inner.store.complete_request(request.id).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if execution.state.is_terminal() {
        // Late action after cancellation or completion: no effect.
        inner.store.complete_request(request.id).await?;
        return Ok(());
    }

    let node = inner
        .store
        .get_node_unscoped(execution.workflow_id, &execution.node_id)
        .await?;
    let canvas = inner.store.get_canvas(execution.workflow_id).await?.canvas;
    let edges = runtime_edges(&inner.registry, &canvas)?;

    let component = match inner.registry.component(node.node_ref.name()) {
        Ok(component) => component,
        Err(error) => {
            inner.store.complete_request(request.id).await?;
            inner
                .store
                .finish_execution(execution.id, ExecutionResult::Error, Some(error.to_string()))
                .await?;
            return Ok(());
        }
    };
    let fields = component.configuration();
    let integration = resolve_integration(&inner.registry, &node, &fields);
    let ctx = inner
        .contexts
        .execution_context(
            canvas.organization_id,
            execution.clone(),
            node.clone(),
            integration,
        )
        .await?;
    let mut action_ctx = ActionContext::new(
        request.action_name.clone(),
        request.parameters.clone(),
        ctx,
    );

    let result = component.handle_action(&mut action_ctx).await;
    let mut ctx = action_ctx.into_inner();
    let effects = ctx.take_effects();

    inner.store.complete_request(request.id).await?;
    match result {
        Ok(()) => apply_effects_to_store(inner, &execution, &node, &edges, effects).await,
        Err(error) => {
            inner
                .store
                .finish_execution(execution.id, ExecutionResult::Error, Some(error.to_string()))
                .await?;
            reset_node_state(inner, &node).await;
            Ok(())
        }
    }
}

/// Put a `processing` node back to `ready` once its execution finished.
async fn reset_node_state(inner: &Inner, node: &CanvasNodeRow) {
    if node.state != NodeState::Processing {
        return;
    }
    if let Err(error) = inner
        .store
        .set_node_state(node.workflow_id, &node.node_id, NodeState::Ready, None)
        .await
    {
        tracing::debug!(node = %node.node_id, %error, "node state reset skipped");
    }
}

/// When a blueprint-internal execution with no further internal edges
/// finishes, the outer blueprint execution completes too. Cascades
/// upward through nested blueprints.
async fn finish_parent_if_terminal(
    inner: &Inner,
    execution: &ExecutionRow,
    node: &CanvasNodeRow,
    edges: &[Edge],
) {
    let mut parent_id = execution.parent_execution_id;
    let mut node = node.clone();

    while let Some(parent_execution_id) = parent_id {
        let Some(parent_node_id) = &node.parent_node_id else {
            return;
        };
        let prefix = format!("{parent_node_id}:");
        let has_internal_successor = edges
            .iter()
            .any(|e| e.source_id == node.node_id && e.target_id.starts_with(&prefix));
        if has_internal_successor {
            return;
        }

        match inner
            .store
            .finish_execution(parent_execution_id, ExecutionResult::Passed, None)
            .await
        {
            Ok(parent) => {
                let Ok(parent_node) = inner
                    .store
                    .get_node_unscoped(parent.workflow_id, &parent.node_id)
                    .await
                else {
                    return;
                };
                reset_node_state(inner, &parent_node).await;
                parent_id = parent.parent_execution_id;
                node = parent_node;
            }
            Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => return,
            Err(error) => {
                tracing::warn!(parent = %parent_execution_id, %error, "parent finalisation failed");
                return;
            }
        }
    }
}
