//! Per-thread token usage aggregation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tiller_domain::{ThreadId, TokenUsage};

/// Folds usage events into a running aggregate per thread.
///
/// Input/output counts accumulate; the context window is replaced by
/// the latest reported value.
#[derive(Clone, Default)]
pub struct UsageTracker {
    usage: Arc<Mutex<HashMap<ThreadId, TokenUsage>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a usage update and return the new aggregate.
    pub fn apply(
        &self,
        thread_id: &ThreadId,
        input_tokens: u64,
        output_tokens: u64,
        context_window: Option<u64>,
    ) -> TokenUsage {
        let mut usage = self.usage.lock().unwrap();
        let entry = usage.entry(thread_id.clone()).or_default();
        entry.apply(input_tokens, output_tokens, context_window);
        *entry
    }

    /// Current aggregate for a thread.
    pub fn get(&self, thread_id: &ThreadId) -> TokenUsage {
        self.usage
            .lock()
            .unwrap()
            .get(thread_id)
            .copied()
            .unwrap_or_default()
    }

    /// Reset a thread's aggregate (on restart).
    pub fn reset(&self, thread_id: &ThreadId) {
        self.usage.lock().unwrap().remove(thread_id);
    }
}
