//! Core types for the loomwork canvas engine.
//!
//! This module defines the fundamental identifiers and state enums used
//! throughout the system: what kind of node sits on a canvas, what state a
//! persisted node or execution is in, and how those states are encoded for
//! storage. These are the core domain concepts that define what a canvas
//! *is*; runtime shapes (rows, contexts) live in [`crate::store`] and
//! [`crate::execution`].
//!
//! # Examples
//!
//! ```rust
//! use loomwork::types::{ExecutionState, NodeType};
//!
//! let ty = NodeType::Component;
//! assert_eq!(ty.encode(), "component");
//! assert_eq!(NodeType::decode("blueprint"), Some(NodeType::Blueprint));
//!
//! assert!(ExecutionState::Pending.is_active());
//! assert!(!ExecutionState::Finished.is_active());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the output channel edges subscribe to when none is given.
pub const DEFAULT_CHANNEL: &str = "default";

/// The kind of a node on a canvas.
///
/// Widget nodes are display-only: they are never persisted as executable
/// workflow nodes and may not be an endpoint of any edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A pluggable component resolved by name from the registry.
    Component,
    /// A reusable sub-graph embedded as a single node.
    Blueprint,
    /// An event source; runs no `Execute`, only feeds events in.
    Trigger,
    /// Display-only; never executed, never an edge endpoint.
    Widget,
}

impl NodeType {
    /// Encode into the persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            NodeType::Component => "component",
            NodeType::Blueprint => "blueprint",
            NodeType::Trigger => "trigger",
            NodeType::Widget => "widget",
        }
    }

    /// Decode a persisted string form; `None` for unknown values.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "component" => Some(NodeType::Component),
            "blueprint" => Some(NodeType::Blueprint),
            "trigger" => Some(NodeType::Trigger),
            "widget" => Some(NodeType::Widget),
            _ => None,
        }
    }

    /// Returns `true` for node types that can execute work.
    ///
    /// Blueprints count: they dispatch to their first internal node rather
    /// than running a component, but they do occupy the executor.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        !matches!(self, NodeType::Widget)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// State of a persisted canvas node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Set up and idle; eligible for queue processing.
    #[default]
    Ready,
    /// Has at least one in-flight execution.
    Processing,
    /// Setup or configuration failed; `state_reason` carries the message.
    Error,
}

impl NodeState {
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            NodeState::Ready => "ready",
            NodeState::Processing => "processing",
            NodeState::Error => "error",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(NodeState::Ready),
            "processing" => Some(NodeState::Processing),
            "error" => Some(NodeState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Lifecycle state of a node execution.
///
/// Transitions: `Pending → Started → (Finished | Cancelled)`. A pending
/// execution is claimed by at most one worker; the claim protocol lives in
/// [`crate::store::EngineStore::lock_pending_execution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Pending,
    Started,
    Finished,
    Cancelled,
}

impl ExecutionState {
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Started => "started",
            ExecutionState::Finished => "finished",
            ExecutionState::Cancelled => "cancelled",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionState::Pending),
            "started" => Some(ExecutionState::Started),
            "finished" => Some(ExecutionState::Finished),
            "cancelled" => Some(ExecutionState::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` while the execution can still make progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionState::Pending | ExecutionState::Started)
    }

    /// Returns `true` once the execution can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Outcome recorded when an execution reaches a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionResult {
    /// The component completed and emitted its outputs.
    Passed,
    /// The component ran to completion but reported a domain failure.
    Failed,
    /// The component (or the worker on its behalf) errored out.
    Error,
    /// The execution was cancelled externally.
    Cancelled,
}

impl ExecutionResult {
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            ExecutionResult::Passed => "passed",
            ExecutionResult::Failed => "failed",
            ExecutionResult::Error => "error",
            ExecutionResult::Cancelled => "cancelled",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(ExecutionResult::Passed),
            "failed" => Some(ExecutionResult::Failed),
            "error" => Some(ExecutionResult::Error),
            "cancelled" => Some(ExecutionResult::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Kind of a deferred execution request.
///
/// `InvokeAction` is the only kind the scheduler currently delivers; the
/// enum is open for future request types (e.g. wake-ups without an action).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    InvokeAction,
}

impl RequestType {
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            RequestType::InvokeAction => "invokeAction",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "invokeAction" => Some(RequestType::InvokeAction),
            _ => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trip() {
        for ty in [
            NodeType::Component,
            NodeType::Blueprint,
            NodeType::Trigger,
            NodeType::Widget,
        ] {
            assert_eq!(NodeType::decode(ty.encode()), Some(ty));
        }
        assert_eq!(NodeType::decode("gadget"), None);
    }

    #[test]
    fn execution_state_activity() {
        assert!(ExecutionState::Pending.is_active());
        assert!(ExecutionState::Started.is_active());
        assert!(ExecutionState::Finished.is_terminal());
        assert!(ExecutionState::Cancelled.is_terminal());
    }

    #[test]
    fn widget_is_not_executable() {
        assert!(!NodeType::Widget.is_executable());
        assert!(NodeType::Blueprint.is_executable());
    }
}
