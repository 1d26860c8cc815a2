//! 📦 Common data structures, the building blocks of loggy
//!
//! 🎬 COLD OPEN, INT. KAFKA TOPIC, 3:47 AM
//!
//! A payload arrives. JSON, allegedly. It claims to have a `timestamp`.
//! It claims to have a `requestId`. We decode it exactly once, and from that
//! moment on it is a [`LogRecord`]: immutable, owned, and headed for an index
//! named after the day it was born. 🦆
//!
//! This module defines:
//! - [`LogRecord`]: one decoded log event. Never mutated in transit.
//! - [`IndexNaming`]: turns a record's timestamp into its destination index.
//! - [`partition_by_destination`]: splits a batch into per-index groups,
//!   keeping each group in batch order.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 🪵 A single log event, decoded once from a raw queue payload.
///
/// Field names on the wire match what the producers send (`requestId`, camelCase).
/// The `timestamp` is the only field we insist on, because it picks the index.
/// Everything else shrugs and defaults to empty, like a form nobody finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// 🆔 Optional identity. When present it becomes the document `_id`, otherwise
    /// Elasticsearch generates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 🔗 Correlation key, the breadcrumb that ties a request's log lines together.
    #[serde(default, deserialize_with = "null_is_default")]
    pub request_id: String,
    /// 📢 "info", "error", "vibes", not validated against a fixed set.
    #[serde(default, deserialize_with = "null_is_default")]
    pub level: String,
    #[serde(default, deserialize_with = "null_is_default")]
    pub message: String,
    /// 🎒 Arbitrary extra context. `null` and missing both mean empty.
    #[serde(default, deserialize_with = "null_is_default")]
    pub metadata: Map<String, Value>,
    /// ⏰ When it happened. Required. Routes the record to its daily index.
    pub timestamp: DateTime<Utc>,
}

// -- 🕳️ `"message": null`, `"metadata": null`: a thing producers do. We forgive them.
fn null_is_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LogRecord {
    /// 🔍 Decode one raw payload into a record. Structural decoding only, no schema police.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).context(
            "💀 Payload is not a log record. It came in wearing a JSON costume, but the \
             timestamp was missing or the shape was wrong. Skipping it.",
        )
    }
}

/// 🏷️ Decides which daily index a record lands in: `<prefix>-<YYYY.MM.DD>`.
///
/// The date is taken in `offset` (UTC unless configured otherwise), so a pure
/// function of the timestamp. Same calendar day, same index. Always.
#[derive(Debug, Clone)]
pub struct IndexNaming {
    prefix: String,
    offset: FixedOffset,
}

impl IndexNaming {
    pub fn new(prefix: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            prefix: prefix.into(),
            offset,
        }
    }

    /// 📅 The calendar-date part alone, e.g. `2024.01.01`.
    pub fn destination_key(&self, timestamp: &DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.offset)
            .format("%Y.%m.%d")
            .to_string()
    }

    /// 📡 The full index name, e.g. `loggy-logs-2024.01.01`.
    pub fn index_name(&self, timestamp: &DateTime<Utc>) -> String {
        format!("{}-{}", self.prefix, self.destination_key(timestamp))
    }

    /// 🧩 Pattern matching every index this naming can produce, for the index template.
    pub fn index_pattern(&self) -> String {
        format!("{}-*", self.prefix)
    }
}

/// 🔪 Split a batch into per-index groups.
///
/// Groups come back in ascending index-name order; inside a group, records
/// keep the order they had in the batch. Takes ownership because the batch is
/// done being a batch the moment it gets here.
pub fn partition_by_destination(
    batch: Vec<LogRecord>,
    naming: &IndexNaming,
) -> BTreeMap<String, Vec<LogRecord>> {
    let mut groups: BTreeMap<String, Vec<LogRecord>> = BTreeMap::new();
    for record in batch {
        groups
            .entry(naming.index_name(&record.timestamp))
            .or_default()
            .push(record);
    }
    groups
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// 🏭 Test fixture factory: a record with a message and a timestamp, nothing fancy.
    pub(crate) fn record_at(message: &str, year: i32, month: u32, day: u32) -> LogRecord {
        LogRecord {
            id: None,
            request_id: format!("req-{message}"),
            level: "info".into(),
            message: message.into(),
            metadata: Map::new(),
            timestamp: Utc
                .with_ymd_and_hms(year, month, day, 12, 0, 0)
                .single()
                .expect("💀 a valid calendar date refused to exist"),
        }
    }

    fn utc_naming() -> IndexNaming {
        IndexNaming::new("loggy-logs", FixedOffset::east_opt(0).expect("UTC is a valid offset"))
    }

    #[test]
    fn the_one_where_a_full_payload_decodes() -> Result<()> {
        let payload = br#"{
            "id": "abc",
            "requestId": "r-1",
            "level": "error",
            "message": "disk on fire",
            "metadata": {"host": "web-1", "attempt": 3},
            "timestamp": "2024-01-01T10:00:00Z"
        }"#;
        let record = LogRecord::decode(payload)?;
        assert_eq!(record.id.as_deref(), Some("abc"));
        assert_eq!(record.request_id, "r-1");
        assert_eq!(record.level, "error");
        assert_eq!(record.message, "disk on fire");
        assert_eq!(record.metadata["attempt"], 3);
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        Ok(())
    }

    #[test]
    fn the_one_where_null_metadata_is_just_empty() -> Result<()> {
        let record = LogRecord::decode(
            br#"{"requestId":"r","level":"info","message":"m","metadata":null,"timestamp":"2024-01-01T00:00:00+02:00"}"#,
        )?;
        assert!(record.metadata.is_empty());
        assert_eq!(record.id, None);
        Ok(())
    }

    #[test]
    fn the_one_where_null_strings_are_just_empty() -> Result<()> {
        let record = LogRecord::decode(
            br#"{"requestId":null,"level":"info","message":null,"metadata":{},"timestamp":"2024-01-01T00:00:00Z"}"#,
        )?;
        assert_eq!(record.request_id, "");
        assert_eq!(record.message, "");
        assert_eq!(record.level, "info");

        let sparse = LogRecord::decode(br#"{"level":null,"timestamp":"2024-01-01T00:00:00Z"}"#)?;
        assert_eq!(sparse.level, "");
        assert!(sparse.metadata.is_empty());
        Ok(())
    }

    #[test]
    fn the_one_where_missing_timestamp_is_rejected() {
        let result = LogRecord::decode(br#"{"requestId":"r","level":"info","message":"m"}"#);
        assert!(result.is_err(), "no timestamp, no destination, no entry");
    }

    #[test]
    fn the_one_where_garbage_is_rejected() {
        assert!(LogRecord::decode(b"definitely not json").is_err());
        assert!(LogRecord::decode(br#"["an","array"]"#).is_err());
    }

    #[test]
    fn the_one_where_the_same_day_means_the_same_index() {
        let naming = utc_naming();
        let morning = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let mut a = record_at("a", 2024, 1, 1);
        let mut b = record_at("b", 2024, 1, 1);
        a.timestamp = morning;
        b.timestamp = night;
        b.level = "error".into();
        b.metadata.insert("k".into(), Value::from(1));
        assert_eq!(naming.index_name(&a.timestamp), naming.index_name(&b.timestamp));
        assert_eq!(naming.index_name(&a.timestamp), "loggy-logs-2024.01.01");
        assert_eq!(naming.destination_key(&night), "2024.01.01");
    }

    #[test]
    fn the_one_where_the_offset_moves_midnight() {
        // -- 🌏 23:30 UTC on Jan 1st is already Jan 2nd in UTC+1
        let naming = IndexNaming::new("logs", FixedOffset::east_opt(3600).unwrap());
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        assert_eq!(naming.index_name(&late), "logs-2024.01.02");
        assert_eq!(naming.index_pattern(), "logs-*");
    }

    #[test]
    fn the_one_where_a_batch_splits_into_two_days() {
        let batch = vec![
            record_at("first", 2024, 1, 1),
            record_at("second", 2024, 1, 2),
            record_at("third", 2024, 1, 1),
        ];
        let groups = partition_by_destination(batch, &utc_naming());
        assert_eq!(groups.len(), 2);
        let jan_first: Vec<_> = groups["loggy-logs-2024.01.01"]
            .iter()
            .map(|r| r.message.as_str())
            .collect();
        assert_eq!(jan_first, vec!["first", "third"]);
        assert_eq!(groups["loggy-logs-2024.01.02"].len(), 1);
    }
}
