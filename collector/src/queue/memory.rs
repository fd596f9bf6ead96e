//! Bounded in-memory queue backing.
//!
//! Backed by a tokio channel; used by tests and local development. Publish
//! never waits: a full channel reports `QueueError::Full` synchronously,
//! mirroring a non-blocking publish into a bounded OS queue.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::QueueError;

/// Bounded in-process queue.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    name: String,
    tx: mpsc::Sender<Vec<u8>>,
}

impl MemoryQueue {
    /// Create a queue with the given capacity, returning the receiving end
    /// for the consuming side.
    pub fn bounded(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            MemoryQueue {
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish one message without blocking.
    pub fn publish(&self, message: &[u8]) -> Result<(), QueueError> {
        self.tx.try_send(message.to_vec()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                warn!(queue = %self.name, "memory_queue_closed");
                QueueError::Unavailable
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_preserves_order() {
        let (queue, mut rx) = MemoryQueue::bounded("events", 8);

        queue.publish(b"first").unwrap();
        queue.publish(b"second").unwrap();

        assert_eq!(rx.recv().await.unwrap(), b"first");
        assert_eq!(rx.recv().await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_publish_full_queue() {
        let (queue, _rx) = MemoryQueue::bounded("events", 1);

        queue.publish(b"fits").unwrap();
        assert_eq!(queue.publish(b"overflow").unwrap_err(), QueueError::Full);
    }

    #[tokio::test]
    async fn test_publish_closed_queue() {
        let (queue, rx) = MemoryQueue::bounded("events", 1);
        drop(rx);

        assert_eq!(
            queue.publish(b"orphan").unwrap_err(),
            QueueError::Unavailable
        );
    }
}
