//! Per-request orchestration for the batch endpoint.
//!
//! A request moves `Received → Authenticated → Parsed → Dispatching →
//! Responded`. Authentication and parse failures reject the whole batch
//! before any queue interaction; once dispatch begins, per-item publish
//! failures only divert items to the errors queue and the request always
//! reaches a response.

use std::sync::Arc;

use tracing::{info, warn};

use crate::batch::{enrich, parse_batch};
use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::error::CollectError;
use crate::keystore::KeyStore;
use crate::web::origin::OriginGate;
use crate::web::signature::{extract_credential, verify_request};

/// Request-level policy knobs, split from `Config` so the orchestrator does
/// not depend on the process environment.
#[derive(Debug, Clone)]
pub struct CollectPolicy {
    /// Maximum request body size in bytes.
    pub max_batch_bytes: usize,
    /// Maximum serialized size of a single enriched event.
    pub max_event_bytes: usize,
    /// Reject requests without a User-Agent header.
    pub require_user_agent: bool,
    /// Maximum Date header skew in seconds; `None` disables the check.
    pub date_skew_max_secs: Option<u64>,
}

impl Default for CollectPolicy {
    fn default() -> Self {
        CollectPolicy {
            max_batch_bytes: 40 * 1024,
            // extra padding over the published event size limit to cover
            // the enrichment wrapper
            max_event_bytes: 5 * 1024,
            require_user_agent: true,
            date_skew_max_secs: None,
        }
    }
}

/// Everything the orchestrator needs from one HTTP request.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub method: String,
    pub path: String,
    pub date: Option<String>,
    pub signature_header: Option<String>,
    pub query: Option<String>,
    pub user_agent: Option<String>,
    pub remote_addr: String,
    pub body: Vec<u8>,
}

/// Batch-level outcome. Per-item queue failures are counted for logs only;
/// the caller sees the same success response either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceipt {
    pub accepted: usize,
    pub diverted: usize,
}

/// The request orchestrator: composes the key store, clock, origin gate,
/// and dispatcher into the per-request state machine.
pub struct EventCollector {
    keystore: KeyStore,
    clock: Arc<dyn Clock>,
    origins: OriginGate,
    dispatcher: Dispatcher,
    policy: CollectPolicy,
}

impl EventCollector {
    pub fn new(
        keystore: KeyStore,
        clock: Arc<dyn Clock>,
        origins: OriginGate,
        dispatcher: Dispatcher,
        policy: CollectPolicy,
    ) -> Self {
        EventCollector {
            keystore,
            clock,
            origins,
            dispatcher,
            policy,
        }
    }

    pub fn origins(&self) -> &OriginGate {
        &self.origins
    }

    /// Consume one batch request.
    ///
    /// Rejections happen before the first publish, so a rejected batch
    /// leaves both queues untouched.
    pub async fn process(&self, request: CollectRequest) -> Result<BatchReceipt, CollectError> {
        if request.body.len() > self.policy.max_batch_bytes {
            warn!(bytes = request.body.len(), "batch_too_large");
            return Err(CollectError::BatchTooLarge {
                limit: self.policy.max_batch_bytes,
            });
        }

        if self.policy.require_user_agent
            && request.user_agent.as_deref().map_or(true, str::is_empty)
        {
            warn!("user_agent_missing");
            return Err(CollectError::MissingUserAgent);
        }

        let credential = extract_credential(
            request.signature_header.as_deref(),
            request.query.as_deref(),
        )?;

        let key_name = verify_request(
            &self.keystore,
            &credential,
            &request.method,
            &request.path,
            request.date.as_deref(),
            &request.body,
            self.clock.now(),
            self.policy.date_skew_max_secs,
        )
        .map_err(|err| {
            warn!(key = %credential.key_name, error = %err, "authentication_failed");
            err
        })?;

        let batch = parse_batch(&request.body).map_err(|err| {
            warn!(key = %key_name, error = %err, "batch_parse_failed");
            err
        })?;

        // Enrich and size-check the full batch before the first publish.
        let mut enriched = Vec::with_capacity(batch.len());
        for event in batch {
            let event = enrich(event, &request.remote_addr, self.clock.as_ref());
            if let Ok(message) = Dispatcher::encode(&event) {
                if message.len() > self.policy.max_event_bytes {
                    warn!(bytes = message.len(), "event_too_large");
                    return Err(CollectError::EventTooLarge {
                        limit: self.policy.max_event_bytes,
                    });
                }
            }
            enriched.push(event);
        }

        let total = enriched.len();
        let mut diverted = 0usize;
        for event in &enriched {
            if self.dispatcher.dispatch(event).await.is_err() {
                diverted += 1;
            }
        }

        info!(
            key = %key_name,
            accepted = total - diverted,
            diverted = diverted,
            "batch_collected"
        );

        Ok(BatchReceipt {
            accepted: total - diverted,
            diverted,
        })
    }
}
