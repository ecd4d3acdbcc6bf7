//! Per-thread broadcast channels with sequence assignment.

use crate::frame::{ThreadEvent, ThreadFrame};
use std::collections::HashMap;
use std::sync::Arc;
use tiller_domain::ThreadId;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Buffered frames per thread before a lagging subscriber starts
/// losing the oldest ones.
const CHANNEL_CAPACITY: usize = 1024;

struct ChannelEntry {
    sender: broadcast::Sender<ThreadFrame>,
    next_sequence: u64,
}

impl ChannelEntry {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            next_sequence: 0,
        }
    }
}

/// Routes thread events to subscribers, one channel per thread.
#[derive(Clone)]
pub struct EventRouter {
    channels: Arc<RwLock<HashMap<ThreadId, ChannelEntry>>>,
}

impl EventRouter {
    /// Create a new router with no channels.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to a thread's frames, creating the channel on first
    /// use.
    pub async fn subscribe(&self, thread_id: &ThreadId) -> broadcast::Receiver<ThreadFrame> {
        let mut channels = self.channels.write().await;
        let entry = channels
            .entry(thread_id.clone())
            .or_insert_with(ChannelEntry::new);
        entry.sender.subscribe()
    }

    /// Publish an event on a thread's channel.
    ///
    /// The sequence number is assigned under the entry, so frames from
    /// the single per-thread producer are observed in publish order.
    /// Never blocks on consumers; returns the assigned sequence.
    pub async fn publish(&self, thread_id: &ThreadId, event: ThreadEvent) -> u64 {
        let mut channels = self.channels.write().await;
        let entry = channels
            .entry(thread_id.clone())
            .or_insert_with(ChannelEntry::new);

        let sequence = entry.next_sequence;
        entry.next_sequence += 1;

        let frame = ThreadFrame {
            thread_id: thread_id.clone(),
            sequence,
            event,
        };
        // Send errors mean no subscribers; frames are not replayable
        // anyway, so drop silently.
        let _ = entry.sender.send(frame);
        sequence
    }

    /// Drop a thread's channel when nobody is listening anymore.
    pub async fn cleanup(&self, thread_id: &ThreadId) {
        let mut channels = self.channels.write().await;
        if let Some(entry) = channels.get(thread_id) {
            if entry.sender.receiver_count() == 0 {
                channels.remove(thread_id);
                debug!(thread_id = %thread_id, "Removed event channel");
            }
        }
    }

    /// Number of live channels (diagnostics).
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
