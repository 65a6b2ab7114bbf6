//! Typed event bus for per-thread notifications.

use graphchat_client::{Message, ThreadId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Notification for a followed thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    /// A message was created.
    Received {
        /// Thread the message belongs to.
        thread_id: ThreadId,
        /// Translated message.
        message: Message,
    },
    /// A message was edited.
    Edited {
        /// Thread the message belongs to.
        thread_id: ThreadId,
        /// Translated message.
        message: Message,
    },
    /// A message was deleted.
    Deleted {
        /// Thread the message belonged to.
        thread_id: ThreadId,
        /// Deleted message id.
        message_id: String,
    },
    /// A subscription handshake completed.
    Subscribed {
        /// Resource the subscription covers.
        resource: String,
    },
}

/// Multi-listener bus of [`ThreadEvent`]s.
///
/// Every listener sees every event in emission order. Listeners that dropped
/// their receiver are pruned on the next emit.
#[derive(Default)]
pub struct ThreadEventEmitter {
    listeners: Mutex<Vec<mpsc::UnboundedSender<ThreadEvent>>>,
}

impl ThreadEventEmitter {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ThreadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live listener.
    pub fn emit(&self, event: ThreadEvent) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
        if listeners.is_empty() {
            tracing::trace!(?event, "thread event emitted with no listeners");
        }
    }

    /// Number of live listeners as of the last emit.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
