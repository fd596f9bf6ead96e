//! Time source abstraction.
//!
//! Receipt timestamps must come from an injected clock so tests can pin the
//! instant instead of patching process-wide state. The clock is read-only
//! after startup and safe for unsynchronized concurrent reads.

use chrono::{NaiveDateTime, Utc};

/// A source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// Current UTC wall-clock time.
    fn now(&self) -> NaiveDateTime;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Clock pinned to a single instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Render an instant in the wire format: ISO-8601, second precision, no
/// timezone suffix.
pub fn format_timestamp(instant: NaiveDateTime) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S").to_string()
}
