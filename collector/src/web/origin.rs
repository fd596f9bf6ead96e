//! CORS allow-list enforcement for the batch endpoint.
//!
//! Cross-origin access is browser-enforced: the gate only controls whether
//! grant headers appear on responses. Preflights from unlisted origins are
//! refused outright; actual POSTs are processed either way, with grants
//! echoed only for allowed origins.

use std::collections::HashSet;

use axum::http::{header, HeaderMap, HeaderValue};

/// Headers a cross-origin client may send with a batch.
pub const ALLOWED_REQUEST_HEADERS: &str = "X-Signature, Content-Type, Date";

/// Methods granted to allowed origins.
pub const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Preflight cache lifetime: 20 days.
pub const MAX_AGE_SECS: &str = "1728000";

const ALLOWED_REQUEST_HEADER_NAMES: [&str; 3] = ["x-signature", "content-type", "date"];

/// Why a preflight was refused. Logged, never disclosed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightRejection {
    MissingHeaders,
    BadMethod,
    BadRequestedHeaders,
    BadOrigin,
}

impl PreflightRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            PreflightRejection::MissingHeaders => "missing_headers",
            PreflightRejection::BadMethod => "bad_method",
            PreflightRejection::BadRequestedHeaders => "bad_requested_headers",
            PreflightRejection::BadOrigin => "bad_origin",
        }
    }
}

/// Exact-match set of origins granted cross-origin access.
///
/// A configured `*` entry allows every origin.
#[derive(Debug, Clone, Default)]
pub struct OriginGate {
    origins: HashSet<String>,
    allow_any: bool,
}

impl OriginGate {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = HashSet::new();
        let mut allow_any = false;
        for origin in origins {
            let origin = origin.into();
            if origin == "*" {
                allow_any = true;
            } else {
                set.insert(origin);
            }
        }
        OriginGate {
            origins: set,
            allow_any,
        }
    }

    /// Whether the reported origin may receive CORS grants.
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allow_any || self.origins.contains(origin)
    }

    /// Grant headers echoed to an allowed origin.
    pub fn grant_headers(&self, origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let allow_origin = if self.allow_any { "*" } else { origin };
        if let Ok(value) = HeaderValue::from_str(allow_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_REQUEST_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(MAX_AGE_SECS),
        );
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers
    }

    /// Validate a preflight request.
    ///
    /// Requires `Origin` and `Access-Control-Request-Method: POST`; any
    /// requested headers must fall within the allowed set.
    pub fn check_preflight<'a>(
        &self,
        origin: Option<&'a str>,
        requested_method: Option<&str>,
        requested_headers: Option<&str>,
    ) -> Result<&'a str, PreflightRejection> {
        let (origin, method) = match (origin, requested_method) {
            (Some(origin), Some(method)) => (origin, method),
            _ => return Err(PreflightRejection::MissingHeaders),
        };

        if method != "POST" {
            return Err(PreflightRejection::BadMethod);
        }

        if let Some(requested) = requested_headers {
            for name in requested.split(',') {
                let name = name.trim().to_ascii_lowercase();
                if name.is_empty() {
                    continue;
                }
                if !ALLOWED_REQUEST_HEADER_NAMES.contains(&name.as_str()) {
                    return Err(PreflightRejection::BadRequestedHeaders);
                }
            }
        }

        if !self.is_allowed(origin) {
            return Err(PreflightRejection::BadOrigin);
        }

        Ok(origin)
    }
}
