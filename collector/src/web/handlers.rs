//! Batch endpoint handlers.
//!
//! Handlers stay thin: they translate the HTTP surface into a
//! `CollectRequest`, hand it to the `EventCollector`, and map the outcome
//! to a status code. Rejection responses carry no body, so callers cannot
//! tell a MAC mismatch apart from other credential problems.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, RawQuery, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::collector::{CollectRequest, EventCollector};
use crate::error::CollectError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<EventCollector>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(collector: Arc<EventCollector>, trust_forwarded_for: bool) -> Self {
        Self {
            collector,
            trust_forwarded_for,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Batch Collection
// =============================================================================

/// `POST /v1`: the signed batch endpoint.
///
/// The response reflects only batch-level outcomes; per-item queue failures
/// are diverted by the dispatcher and never change the status code.
pub async fn collect_events(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let remote_addr = client_addr(&addr, &headers, state.trust_forwarded_for);
    let origin = header_string(&headers, "origin");

    let request = CollectRequest {
        method: "POST".to_string(),
        path: uri.path().to_string(),
        date: header_string(&headers, "date"),
        signature_header: header_string(&headers, "x-signature"),
        query,
        user_agent: header_string(&headers, "user-agent"),
        remote_addr,
        body: body.to_vec(),
    };

    let status = match state.collector.process(request).await {
        Ok(receipt) => {
            info!(
                accepted = receipt.accepted,
                diverted = receipt.diverted,
                "batch_accepted"
            );
            StatusCode::OK
        }
        Err(err) => rejection_status(&err),
    };

    // CORS grants are independent of the batch outcome.
    let mut response = status.into_response();
    if let Some(origin) = origin {
        let origins = state.collector.origins();
        if origins.is_allowed(&origin) {
            response.headers_mut().extend(origins.grant_headers(&origin));
        }
    }
    response
}

/// `OPTIONS /v1`: CORS preflight.
pub async fn preflight(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let origin = header_string(&headers, "origin");
    let requested_method = header_string(&headers, "access-control-request-method");
    let requested_headers = header_string(&headers, "access-control-request-headers");

    let origins = state.collector.origins();
    match origins.check_preflight(
        origin.as_deref(),
        requested_method.as_deref(),
        requested_headers.as_deref(),
    ) {
        Ok(origin) => {
            info!(origin = origin, "preflight_allowed");
            (StatusCode::NO_CONTENT, origins.grant_headers(origin)).into_response()
        }
        Err(rejection) => {
            warn!(reason = rejection.reason(), "preflight_rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Map a request-level rejection to its status code. Bodies stay empty: the
/// status is all a rejected caller learns.
fn rejection_status(err: &CollectError) -> StatusCode {
    match err {
        CollectError::Auth(_) => StatusCode::FORBIDDEN,
        CollectError::Parse(_) | CollectError::MissingUserAgent => StatusCode::BAD_REQUEST,
        CollectError::BatchTooLarge { .. } | CollectError::EventTooLarge { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Resolve the caller's address: the first `X-Forwarded-For` entry when the
/// deployment fronts the collector with a trusted proxy, otherwise the
/// connection peer.
fn client_addr(addr: &SocketAddr, headers: &HeaderMap, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    addr.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::collector::CollectPolicy;
    use crate::dispatch::Dispatcher;
    use crate::error::{AuthError, ParseError};
    use crate::keystore::KeyStore;
    use crate::queue::{MemoryQueue, QueueHandle};
    use crate::web::origin::OriginGate;
    use crate::web::signature::{canonical_request, compute_mac};
    use chrono::NaiveDate;

    fn peer() -> SocketAddr {
        "1.2.3.4:5678".parse().unwrap()
    }

    fn test_state() -> AppState {
        let keystore = KeyStore::from_config(vec![("TestKey1", "dGVzdA==")]).unwrap();
        let clock = FixedClock(
            NaiveDate::from_ymd_opt(2015, 11, 17)
                .unwrap()
                .and_hms_opt(12, 34, 56)
                .unwrap(),
        );
        let (events, _events_rx) = MemoryQueue::bounded("events", 16);
        let (errors, _errors_rx) = MemoryQueue::bounded("errors", 16);
        let collector = EventCollector::new(
            keystore,
            Arc::new(clock),
            OriginGate::new(vec!["https://example.com"]),
            Dispatcher::new(QueueHandle::Memory(events), QueueHandle::Memory(errors)),
            CollectPolicy::default(),
        );
        AppState::new(Arc::new(collector), false)
    }

    fn base_headers(body: &[u8], date: &str) -> HeaderMap {
        let mac = compute_mac(b"test", &canonical_request("POST", "/v1", Some(date), body))
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "TestApp/1.0".parse().unwrap());
        headers.insert("date", date.parse().unwrap());
        headers.insert(
            "x-signature",
            format!("key=TestKey1, mac={mac}").parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_collect_events_accepts_signed_batch() {
        let body: &[u8] = br#"[{"event1":"value"}]"#;
        let date = "Wed, 25 Nov 2015 06:25:24 GMT";
        let mut headers = base_headers(body, date);
        headers.insert("origin", "https://example.com".parse().unwrap());

        let response = collect_events(
            State(test_state()),
            ConnectInfo(peer()),
            Uri::from_static("/v1"),
            RawQuery(None),
            headers,
            Bytes::from_static(body),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn test_collect_events_rejects_bad_mac_without_cors() {
        let date = "Wed, 25 Nov 2015 06:25:24 GMT";
        let mut headers = base_headers(br#"[{"event1":"value"}]"#, date);
        headers.insert("origin", "https://notexample.com".parse().unwrap());

        // The body differs from the one the MAC covers.
        let response = collect_events(
            State(test_state()),
            ConnectInfo(peer()),
            Uri::from_static("/v1"),
            RawQuery(None),
            headers,
            Bytes::from_static(br#"[{"event1":"tampered"}]"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn test_preflight_allowed_origin() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", "https://example.com".parse().unwrap());
        headers.insert("access-control-request-method", "POST".parse().unwrap());

        let response = preflight(State(test_state()), headers).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn test_preflight_unlisted_origin_gets_no_grants() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", "https://notexample.com".parse().unwrap());
        headers.insert("access-control-request-method", "POST".parse().unwrap());

        let response = preflight(State(test_state()), headers).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[test]
    fn test_client_addr_uses_peer_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9".parse().unwrap());
        assert_eq!(client_addr(&peer(), &headers, false), "1.2.3.4");
    }

    #[test]
    fn test_client_addr_trusts_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_addr(&peer(), &headers, true), "9.9.9.9");
    }

    #[test]
    fn test_client_addr_falls_back_without_forwarded_header() {
        let headers = HeaderMap::new();
        assert_eq!(client_addr(&peer(), &headers, true), "1.2.3.4");
    }

    #[test]
    fn test_rejection_status_mapping() {
        assert_eq!(
            rejection_status(&CollectError::Auth(AuthError::BadMac)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            rejection_status(&CollectError::Auth(AuthError::UnknownKey)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            rejection_status(&CollectError::Parse(ParseError::InvalidJson)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            rejection_status(&CollectError::MissingUserAgent),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            rejection_status(&CollectError::BatchTooLarge { limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
