//! Queue handles for the two-sink architecture.
//!
//! ```text
//! POST /v1 → events queue → downstream consumer (separate process)
//!          ↘ errors queue → diagnostics consumer
//! ```
//!
//! The concrete backing is chosen once at startup and owned for the
//! process's lifetime; request handlers only see `QueueHandle`.

pub mod memory;
pub mod publisher;

use std::time::Duration;

use crate::error::QueueError;

pub use memory::MemoryQueue;
pub use publisher::AmqpPublisher;

/// Handle to a named, bounded, process-external queue.
#[derive(Clone)]
pub enum QueueHandle {
    /// AMQP-backed queue (production).
    Amqp {
        publisher: AmqpPublisher,
        queue: String,
        publish_timeout: Duration,
    },
    /// Bounded in-memory channel (tests, local development).
    Memory(MemoryQueue),
}

impl QueueHandle {
    /// Publish one message without blocking beyond the configured bound.
    pub async fn publish(&self, message: &[u8]) -> Result<(), QueueError> {
        match self {
            QueueHandle::Amqp {
                publisher,
                queue,
                publish_timeout,
            } => publisher.publish(queue, message, *publish_timeout).await,
            QueueHandle::Memory(queue) => queue.publish(message),
        }
    }

    /// Queue name, for log events.
    pub fn name(&self) -> &str {
        match self {
            QueueHandle::Amqp { queue, .. } => queue,
            QueueHandle::Memory(queue) => queue.name(),
        }
    }
}
