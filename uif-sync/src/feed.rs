//! Fan-out of committed tree changes to rendering consumers.
//!
//! Uses a tokio broadcast channel: one encode per transaction, O(1) send to all
//! renderers. Each renderer buffers up to `capacity` updates; a renderer that
//! falls further behind sees `Lagged` and is resynchronized with a snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::{ProtocolError, RenderMessage, WireMessage};

/// Statistics for monitoring feed health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub messages_sent: u64,
    pub resyncs: u64,
    pub active_renderers: usize,
}

pub struct RenderFeed {
    sender: broadcast::Sender<Arc<String>>,
    capacity: usize,
    messages_sent: AtomicU64,
    resyncs: AtomicU64,
}

impl RenderFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            messages_sent: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
        }
    }

    /// Encode once and fan out. Returns the number of renderers reached.
    ///
    /// Never blocks, so it is safe to call while the scene lock is held.
    pub fn publish(&self, msg: &RenderMessage) -> Result<usize, ProtocolError> {
        let encoded = Arc::new(msg.encode()?);
        let count = self.sender.send(encoded).unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(count)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<String>> {
        self.sender.subscribe()
    }

    pub(crate) fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn renderer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            active_renderers: self.renderer_count(),
        }
    }
}
