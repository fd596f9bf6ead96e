//! Event collector: authenticated HTTP front door for batched event
//! ingestion.
//!
//! ## Architecture
//!
//! ```text
//! POST /v1 → origin gate → signature verifier → batch parser/enricher
//!          → dispatcher → events queue (per-item failures → errors queue)
//! ```
//!
//! The queue consumer side is a separate process and not part of this
//! crate.

pub mod batch;
pub mod clock;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keystore;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use batch::{EnrichedEvent, RawEvent};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collector::{BatchReceipt, CollectPolicy, CollectRequest, EventCollector};
pub use config::{Config, QueueBackendKind};
pub use dispatch::Dispatcher;
pub use error::{AuthError, CollectError, ParseError, QueueError};
pub use keystore::{KeyStore, Secret};
pub use queue::{AmqpPublisher, MemoryQueue, QueueHandle};
pub use web::AppState;
