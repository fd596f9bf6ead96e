//! Error taxonomy for the collector request path.
//!
//! Request-level errors (`AuthError`, `ParseError`) reject the whole batch
//! before any queue interaction. `QueueError` is per-item and recovered by
//! the dispatcher; it never surfaces in the HTTP response.

use thiserror::Error;

/// Authentication failures for the signed batch endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Credential header/query parameters missing or unparseable.
    #[error("malformed credential")]
    MalformedHeader,
    /// Credential names a key that is not configured.
    #[error("unknown key")]
    UnknownKey,
    /// MAC does not match the canonical request.
    #[error("MAC mismatch")]
    BadMac,
    /// Date header missing, unparseable, or outside the accepted window.
    #[error("stale Date header")]
    StaleDate,
}

/// Batch payload failures. A single bad item rejects the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Body is not valid JSON.
    #[error("body is not valid JSON")]
    InvalidJson,
    /// Decoded JSON root is not an array.
    #[error("JSON root must be an array")]
    NotArray,
    /// An array element is not a JSON object.
    #[error("batch items must be JSON objects")]
    InvalidItem,
}

/// Per-item queue publish failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The destination queue rejected the message synchronously.
    #[error("queue full")]
    Full,
    /// The queue backing is disconnected or refused the publish.
    #[error("queue unavailable")]
    Unavailable,
}

impl QueueError {
    /// Short identifier used in diagnostic records and log events.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::Full => "full",
            QueueError::Unavailable => "unavailable",
        }
    }
}

/// Request-level rejection reasons for `POST /v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Request body exceeds the configured batch limit.
    #[error("batch exceeds {limit} bytes")]
    BatchTooLarge { limit: usize },
    /// A single serialized event exceeds the configured event limit.
    #[error("serialized event exceeds {limit} bytes")]
    EventTooLarge { limit: usize },
    /// User-Agent header required but absent.
    #[error("User-Agent header required")]
    MissingUserAgent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_kind() {
        assert_eq!(QueueError::Full.kind(), "full");
        assert_eq!(QueueError::Unavailable.kind(), "unavailable");
    }

    #[test]
    fn test_collect_error_from_auth() {
        let err: CollectError = AuthError::BadMac.into();
        assert_eq!(err, CollectError::Auth(AuthError::BadMac));
        assert_eq!(err.to_string(), "MAC mismatch");
    }

    #[test]
    fn test_collect_error_from_parse() {
        let err: CollectError = ParseError::NotArray.into();
        assert_eq!(err, CollectError::Parse(ParseError::NotArray));
    }
}
