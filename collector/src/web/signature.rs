//! Batch endpoint signature verification.
//!
//! Clients sign requests with HMAC-SHA256 over a canonical request string
//! and present the result in an `X-Signature` header:
//!
//! ```text
//! X-Signature: key=KeyName, mac=0123abcd...
//! ```
//!
//! The canonical request is `METHOD "\n" PATH "\n" DATE "\n" BODY`, where
//! DATE is the literal Date header value (empty when absent) and BODY is
//! the raw, unparsed body bytes. Header values and the request line cannot
//! contain raw newlines, so the fields cannot bleed into each other.

use chrono::{DateTime, NaiveDateTime};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::AuthError;
use crate::keystore::KeyStore;

type HmacSha256 = Hmac<Sha256>;

// Stands in for the secret on the unknown-key path so that path does the
// same amount of MAC work as a mismatch.
const DUMMY_SECRET: &[u8] = b"INVALID";

/// Parsed form of the credential header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub key_name: String,
    pub mac: String,
}

/// Parse a `key=<name>, mac=<hex>` credential header.
///
/// Unrecognized parameters are ignored; a parameter without `=`, or a
/// missing `key` or `mac`, is malformed.
pub fn parse_signature(header: &str) -> Result<SignatureHeader, AuthError> {
    let mut key_name = None;
    let mut mac = None;

    for pair in header.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').ok_or(AuthError::MalformedHeader)?;
        match name.trim() {
            "key" => key_name = Some(value.trim().to_string()),
            "mac" => mac = Some(value.trim().to_string()),
            _ => {}
        }
    }

    match (key_name, mac) {
        (Some(key_name), Some(mac)) => Ok(SignatureHeader { key_name, mac }),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Extract the credential from the header, falling back to `key`/`mac`
/// query parameters for clients that cannot set custom headers.
pub fn extract_credential(
    header: Option<&str>,
    query: Option<&str>,
) -> Result<SignatureHeader, AuthError> {
    if let Some(header) = header {
        return parse_signature(header);
    }

    let query = query.ok_or(AuthError::MalformedHeader)?;
    let mut key_name = None;
    let mut mac = None;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match name.as_ref() {
            "key" => key_name = Some(value.into_owned()),
            "mac" => mac = Some(value.into_owned()),
            _ => {}
        }
    }
    match (key_name, mac) {
        (Some(key_name), Some(mac)) => Ok(SignatureHeader { key_name, mac }),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Build the canonical request string covered by the MAC.
pub fn canonical_request(method: &str, path: &str, date: Option<&str>, body: &[u8]) -> Vec<u8> {
    let mut canonical = Vec::with_capacity(method.len() + path.len() + body.len() + 32);
    canonical.extend_from_slice(method.as_bytes());
    canonical.push(b'\n');
    canonical.extend_from_slice(path.as_bytes());
    canonical.push(b'\n');
    canonical.extend_from_slice(date.unwrap_or("").as_bytes());
    canonical.push(b'\n');
    canonical.extend_from_slice(body);
    canonical
}

/// Compute the hex MAC for a canonical request under the given secret.
///
/// Returns `None` only if the MAC primitive rejects the key, which
/// HMAC-SHA256 never does.
pub fn compute_mac(secret: &[u8], canonical: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(canonical);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a request credential against the key store.
///
/// On success returns the authenticated key name, propagated for
/// observability only.
#[allow(clippy::too_many_arguments)]
pub fn verify_request(
    keystore: &KeyStore,
    credential: &SignatureHeader,
    method: &str,
    path: &str,
    date: Option<&str>,
    body: &[u8],
    now: NaiveDateTime,
    max_date_skew_secs: Option<u64>,
) -> Result<String, AuthError> {
    if let Some(window) = max_date_skew_secs {
        check_date_window(date, now, window)?;
    }

    let canonical = canonical_request(method, path, date, body);

    let secret = match keystore.get(&credential.key_name) {
        Some(secret) => secret,
        None => {
            // Unknown keys still pay for a MAC computation, keeping this
            // path from returning measurably faster than a mismatch.
            let _ = compute_mac(DUMMY_SECRET, &canonical);
            return Err(AuthError::UnknownKey);
        }
    };

    let expected = compute_mac(secret.bytes(), &canonical).ok_or(AuthError::BadMac)?;

    if !constant_time_compare(&expected, &credential.mac) {
        return Err(AuthError::BadMac);
    }

    Ok(secret.name().to_string())
}

/// Enforce the configured Date staleness window.
fn check_date_window(
    date: Option<&str>,
    now: NaiveDateTime,
    window_secs: u64,
) -> Result<(), AuthError> {
    let raw = date.ok_or(AuthError::StaleDate)?;
    let sent = DateTime::parse_from_rfc2822(raw)
        .map_err(|_| AuthError::StaleDate)?
        .naive_utc();

    let skew = (now - sent).num_seconds().unsigned_abs();
    if skew > window_secs {
        warn!(
            skew_secs = skew,
            window_secs = window_secs,
            "date_outside_window"
        );
        return Err(AuthError::StaleDate);
    }
    Ok(())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
