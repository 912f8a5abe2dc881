//! Notice sinks.

use std::sync::{Arc, Mutex};

use super::Notice;

/// Receives notices drained from the hub.
pub trait NoticeSink: Send + Sync {
    fn handle(&self, notice: &Notice);
}

/// Emits each notice as a tracing event.
pub struct TracingSink;

impl NoticeSink for TracingSink {
    fn handle(&self, notice: &Notice) {
        tracing::info!(kind = %notice.kind, payload = %notice.payload, "notice");
    }
}

/// Captures notices for assertions in tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("memory sink poisoned").clone()
    }
}

impl NoticeSink for MemorySink {
    fn handle(&self, notice: &Notice) {
        self.notices
            .lock()
            .expect("memory sink poisoned")
            .push(notice.clone());
    }
}
