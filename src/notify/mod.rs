//! Fire-and-forget notification hub.
//!
//! Carries engine-internal notices (`canvas.updated`, executor
//! diagnostics) to pluggable sinks over a flume channel drained by a
//! background task. Sends never block and never fail the caller: if the
//! hub is gone the notice is dropped and a debug line is traced. This is
//! the process-local stand-in for an external message bus.

mod sink;

pub use sink::{MemorySink, NoticeSink, TracingSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Kind constant for canvas-updated notices.
pub const CANVAS_UPDATED: &str = "canvas.updated";

/// One notice published on the hub.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub kind: String,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            at: Utc::now(),
        }
    }
}

/// Handle for publishing notices; cheap to clone.
#[derive(Clone)]
pub struct NoticeHub {
    tx: flume::Sender<Notice>,
}

impl NoticeHub {
    /// Build a hub draining into the given sinks from a background task.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Arc<dyn NoticeSink>>) -> Self {
        let (tx, rx) = flume::unbounded::<Notice>();
        tokio::spawn(async move {
            while let Ok(notice) = rx.recv_async().await {
                for sink in &sinks {
                    sink.handle(&notice);
                }
            }
        });
        Self { tx }
    }

    /// Hub that only traces notices.
    #[must_use]
    pub fn tracing_only() -> Self {
        Self::with_sinks(vec![Arc::new(TracingSink)])
    }

    /// Publish a notice. Fire-and-forget: a closed hub drops the notice.
    pub fn publish(&self, kind: impl Into<String>, payload: Value) {
        let notice = Notice::new(kind, payload);
        if self.tx.send(notice).is_err() {
            tracing::debug!("notice hub closed; dropping notice");
        }
    }
}

impl std::fmt::Debug for NoticeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeHub").finish()
    }
}
