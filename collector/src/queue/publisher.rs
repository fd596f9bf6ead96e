//! Async AMQP publisher for the events and errors queues.
//!
//! This module provides a connection-pooled publisher that can be shared
//! across request handlers, automatically reconnecting on failure. Publish
//! confirms are bounded by a short timeout so a saturated broker degrades
//! to a per-item `QueueError` instead of stalling handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::QueueError;

/// Shared AMQP publisher with connection management.
///
/// The publisher maintains a persistent connection and channel, declaring
/// the configured queues on every (re)connect.
#[derive(Clone)]
pub struct AmqpPublisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    queues: Vec<String>,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl AmqpPublisher {
    /// Create a publisher that declares the given queues on connect.
    pub fn new(url: String, queues: Vec<String>) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                queues,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        // Check if we have a valid channel
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        // Need to reconnect
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("amqp_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to AMQP broker")?;

        info!("amqp_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        // Declare destination queues (idempotent operation)
        for queue in &self.inner.queues {
            ch.queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to declare queue {queue}"))?;
        }

        info!(queues = ?self.inner.queues, "amqp_queues_declared");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish one message to the named queue, bounded by `publish_timeout`.
    ///
    /// A confirm that does not arrive within the bound is treated as a full
    /// queue; connection or protocol failures as an unavailable one.
    pub async fn publish(
        &self,
        queue: &str,
        message: &[u8],
        publish_timeout: Duration,
    ) -> Result<(), QueueError> {
        let channel = match self.ensure_connected().await {
            Ok(ch) => ch,
            Err(err) => {
                warn!(queue = queue, error = %err, "amqp_connect_failed");
                return Err(QueueError::Unavailable);
            }
        };

        let publish = async {
            channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    message,
                    BasicProperties::default()
                        .with_delivery_mode(2) // Persistent
                        .with_content_type("application/json".into()),
                )
                .await
                .context("Failed to publish")?
                .await
                .context("Failed to confirm publish")
        };

        match timeout(publish_timeout, publish).await {
            Ok(Ok(_confirmation)) => Ok(()),
            Ok(Err(err)) => {
                warn!(queue = queue, error = %err, "amqp_publish_failed");
                Err(QueueError::Unavailable)
            }
            Err(_elapsed) => {
                warn!(
                    queue = queue,
                    timeout_ms = publish_timeout.as_millis() as u64,
                    "amqp_publish_timeout"
                );
                Err(QueueError::Full)
            }
        }
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "amqp_connection_close_error");
            }
        }

        info!("amqp_publisher_closed");
    }
}
