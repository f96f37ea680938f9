//! Event Schema Registry for the platform message bus
//!
//! Producers publish one JSON body per change notification and carry the event type
//! out-of-band in a message header as a dotted class-like name. Only the final segment
//! of that name selects the payload shape, see [`EventKind::from_type_id`].
//!
//! Payloads are value objects. Field names are camelCase on the wire; legacy producer
//! names are accepted through serde aliases so both generations decode to the same type.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// Domain events enumeration
pub mod events;

// Re-export commonly used types
pub use events::{
    AuditLogEntry, ContentCreated, ContentDeleted, ContentUpdated, DomainEvent, EventKind,
    IdentityDeleted, IdentityUpdated, SearchQueryIssued,
};

/// Header carrying the fully-qualified event type name
pub const TYPE_ID_HEADER: &str = "__TypeId__";

/// Timestamp as sent by producers.
///
/// Producers are inconsistent: some emit RFC 3339, some emit a zone-less ISO-8601 local
/// date-time, some emit epoch numbers. The raw value is kept so the consumer can resolve
/// zone-less values in its configured offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(i64),
    Text(String),
}

impl RawTimestamp {
    /// Resolve into an absolute instant expressed in `offset`.
    ///
    /// Returns `None` when the value cannot be interpreted.
    pub fn resolve(&self, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        match self {
            RawTimestamp::Epoch(value) => {
                // Treat 10-digit values as seconds, 13+ as milliseconds.
                let (secs, nanos) = if value.abs() < 1_000_000_000_000 {
                    (*value, 0)
                } else {
                    (value / 1000, (value % 1000) * 1_000_000)
                };
                DateTime::<Utc>::from_timestamp(secs, u32::try_from(nanos).ok()?)
                    .map(|dt| dt.with_timezone(&offset))
            }
            RawTimestamp::Text(raw) => parse_timestamp(raw, offset),
        }
    }
}

/// Parse a textual timestamp, interpreting zone-less values in `offset`.
pub fn parse_timestamp(raw: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&offset));
    }

    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

/// Deserialize a field that producers may send as `null`, falling back to the default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Content ids are strings, but some producers serialize them as numbers.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    match Id::deserialize(deserializer)? {
        Id::Text(s) if s.trim().is_empty() => Err(serde::de::Error::custom("empty id")),
        Id::Text(s) => Ok(s.trim().to_string()),
        Id::Number(n) => Ok(n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn cst() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_parse_rfc3339_converts_to_offset() {
        let ts = parse_timestamp("2024-05-18T12:34:56Z", cst()).unwrap();
        assert_eq!(ts.timestamp(), 1716035696);
        assert_eq!(ts.hour(), 20);
    }

    #[test]
    fn test_parse_naive_uses_offset() {
        let ts = parse_timestamp("2023-12-19T10:20:30", cst()).unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_timestamp("yesterday", cst()).is_none());
        assert!(parse_timestamp("   ", cst()).is_none());
    }

    #[test]
    fn test_epoch_seconds_and_millis() {
        let secs = RawTimestamp::Epoch(1_716_035_696).resolve(cst()).unwrap();
        let millis = RawTimestamp::Epoch(1_716_035_696_123).resolve(cst()).unwrap();
        assert_eq!(secs.timestamp(), 1_716_035_696);
        assert_eq!(millis.timestamp_millis(), 1_716_035_696_123);
    }

    #[test]
    fn test_raw_timestamp_untagged() {
        let text: RawTimestamp = serde_json::from_str("\"2024-05-18T12:34:56Z\"").unwrap();
        let epoch: RawTimestamp = serde_json::from_str("1716035696").unwrap();
        assert!(matches!(text, RawTimestamp::Text(_)));
        assert!(matches!(epoch, RawTimestamp::Epoch(_)));
    }
}
