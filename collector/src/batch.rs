//! Batch parsing and event enrichment.
//!
//! A batch is one request's JSON array of event objects. Parsing fails
//! closed: a single bad item rejects the whole batch, since authentication
//! already passed and partial acceptance here would complicate the error
//! queue's semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{format_timestamp, Clock};
use crate::error::ParseError;

/// An arbitrary client-submitted JSON object. No required fields.
pub type RawEvent = serde_json::Map<String, Value>;

/// An event wrapped with server-observed metadata.
///
/// Field order is the wire contract: downstream consumers expect `ip`,
/// `event`, `time`, in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub ip: String,
    pub event: RawEvent,
    pub time: String,
}

/// Parse a request body into an ordered batch of raw events.
pub fn parse_batch(raw: &[u8]) -> Result<Vec<RawEvent>, ParseError> {
    let value: Value = serde_json::from_slice(raw).map_err(|_| ParseError::InvalidJson)?;
    let items = match value {
        Value::Array(items) => items,
        _ => return Err(ParseError::NotArray),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(event) => Ok(event),
            _ => Err(ParseError::InvalidItem),
        })
        .collect()
}

/// Wrap a raw event with the caller's address and the receipt time.
///
/// The clock is read per item, not cached across the batch: items may carry
/// marginally different timestamps if the clock advances mid-batch. The
/// time never derives from any client-supplied header.
pub fn enrich(event: RawEvent, ip: &str, clock: &dyn Clock) -> EnrichedEvent {
    EnrichedEvent {
        ip: ip.to_string(),
        event,
        time: format_timestamp(clock.now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDate;

    fn fixed_clock() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2015, 11, 17)
                .unwrap()
                .and_hms_opt(12, 34, 56)
                .unwrap(),
        )
    }

    #[test]
    fn test_parse_batch_preserves_order() {
        let batch = parse_batch(br#"[{"event1":"value"},{"event2":"value"}]"#).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch[0].contains_key("event1"));
        assert!(batch[1].contains_key("event2"));
    }

    #[test]
    fn test_parse_batch_empty_array() {
        let batch = parse_batch(b"[]").unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_parse_batch_invalid_json() {
        assert_eq!(parse_batch(b"!!!").unwrap_err(), ParseError::InvalidJson);
    }

    #[test]
    fn test_parse_batch_not_array() {
        assert_eq!(
            parse_batch(br#"{"event1":"value"}"#).unwrap_err(),
            ParseError::NotArray
        );
    }

    #[test]
    fn test_parse_batch_non_object_item() {
        assert_eq!(
            parse_batch(br#"[{"event1":"value"},42]"#).unwrap_err(),
            ParseError::InvalidItem
        );
    }

    #[test]
    fn test_enrich_wire_format() {
        let batch = parse_batch(br#"[{"event1":"value"}]"#).unwrap();
        let clock = fixed_clock();
        let enriched = enrich(batch.into_iter().next().unwrap(), "1.2.3.4", &clock);

        assert_eq!(
            serde_json::to_string(&enriched).unwrap(),
            r#"{"ip":"1.2.3.4","event":{"event1":"value"},"time":"2015-11-17T12:34:56"}"#
        );
    }

    #[test]
    fn test_enrich_preserves_event_key_order() {
        let batch = parse_batch(br#"[{"zebra":1,"alpha":2}]"#).unwrap();
        let clock = fixed_clock();
        let enriched = enrich(batch.into_iter().next().unwrap(), "1.2.3.4", &clock);

        assert_eq!(
            serde_json::to_string(&enriched).unwrap(),
            r#"{"ip":"1.2.3.4","event":{"zebra":1,"alpha":2},"time":"2015-11-17T12:34:56"}"#
        );
    }

    #[test]
    fn test_enrich_reads_clock_not_headers() {
        let clock = fixed_clock();
        let enriched = enrich(RawEvent::new(), "10.0.0.1", &clock);
        assert_eq!(enriched.time, "2015-11-17T12:34:56");
        assert_eq!(enriched.ip, "10.0.0.1");
        assert!(enriched.event.is_empty());
    }
}
