//! HTTP surface for the collector.
//!
//! Thin axum handlers over the request orchestrator:
//! - Verify the batch credential
//! - Enrich and enqueue accepted events
//! - Enforce the CORS allow-list on preflights
//!
//! All queue trouble is handled below this layer; handlers only ever map
//! batch-level outcomes to status codes.

pub mod handlers;
pub mod origin;
pub mod signature;

pub use handlers::{collect_events, health, preflight, AppState, HealthResponse};
pub use origin::{OriginGate, PreflightRejection};
pub use signature::{
    canonical_request, compute_mac, extract_credential, parse_signature, verify_request,
    SignatureHeader,
};
