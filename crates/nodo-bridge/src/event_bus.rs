use std::sync::{Arc, Mutex, MutexGuard};

use crate::protocol::Notification;

/// A broadcast-style notification bus built on top of flume channels.
///
/// Each call to [`subscribe`](EventBus::subscribe) creates a new receiver
/// that sees every notification published after the subscription was
/// created, in publish order. Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<Notification>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> MutexGuard<'_, Vec<flume::Sender<Notification>>> {
        // Senders hold no invariants a panicking publisher could break.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> flume::Receiver<Notification> {
        let (tx, rx) = flume::unbounded();
        self.senders().push(tx);
        rx
    }

    /// Publish a notification to all current subscribers.
    ///
    /// Disconnected subscribers (whose receivers have been dropped) are
    /// pruned. Returns the number of subscribers that received it.
    pub fn publish(&self, msg: Notification) -> usize {
        let mut senders = self.senders();
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
        tracing::trace!(kind = msg.kind(), delivered = senders.len(), "notification published");
        senders.len()
    }

    /// Return the number of currently active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.senders().len()
    }
}
