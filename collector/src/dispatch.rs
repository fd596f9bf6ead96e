//! Per-item dispatch into the events queue, with error-queue diversion.
//!
//! Events are published one at a time, in batch order. A publish failure
//! diverts the item to the errors queue as a diagnostic record; a failure
//! of that second publish is logged and swallowed so a broken errors queue
//! cannot cascade into the request path.

use serde::Serialize;
use tracing::{error, warn};

use crate::batch::EnrichedEvent;
use crate::error::QueueError;
use crate::queue::QueueHandle;

/// Diagnostic record published to the errors queue when an event cannot be
/// delivered.
#[derive(Debug, Serialize)]
pub struct QueueDiagnostic<'a> {
    pub error: &'static str,
    pub event: &'a EnrichedEvent,
}

/// Publishes enriched events, diverting failures to the errors queue.
#[derive(Clone)]
pub struct Dispatcher {
    events: QueueHandle,
    errors: QueueHandle,
}

impl Dispatcher {
    pub fn new(events: QueueHandle, errors: QueueHandle) -> Self {
        Dispatcher { events, errors }
    }

    /// Wire-encode an event: compact JSON with keys ordered `ip`, `event`,
    /// `time`.
    pub fn encode(event: &EnrichedEvent) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(event).map_err(|err| {
            // Object maps always serialize; an event that cannot be encoded
            // can never reach a sink.
            error!(error = %err, "event_encode_failed");
            QueueError::Unavailable
        })
    }

    /// Publish one enriched event.
    ///
    /// The returned error is informational: the item has already been
    /// diverted, and per-item outcomes never affect the HTTP response.
    pub async fn dispatch(&self, event: &EnrichedEvent) -> Result<(), QueueError> {
        let message = Self::encode(event)?;

        match self.events.publish(&message).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    queue = self.events.name(),
                    error = err.kind(),
                    "event_publish_failed"
                );
                self.divert(event, err).await;
                Err(err)
            }
        }
    }

    /// Best-effort diagnostic publish to the errors queue.
    async fn divert(&self, event: &EnrichedEvent, err: QueueError) {
        let diagnostic = QueueDiagnostic {
            error: err.kind(),
            event,
        };
        let message = match serde_json::to_vec(&diagnostic) {
            Ok(message) => message,
            Err(encode_err) => {
                error!(error = %encode_err, "diagnostic_encode_failed");
                return;
            }
        };
        if let Err(divert_err) = self.errors.publish(&message).await {
            warn!(
                queue = self.errors.name(),
                error = divert_err.kind(),
                "error_queue_publish_failed"
            );
        }
    }
}
