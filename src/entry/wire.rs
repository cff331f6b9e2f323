use super::{EventMeta, LogEntry, Meta};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Hive-style timestamp written by the archiver. No zone, always UTC.
const HIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed wire record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse timestamp '{value}'")]
    Timestamp { value: String },
}

/// Raw JSON shape persisted in archive objects.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireRecord {
    pub event: WireEvent,
    pub fly: WireFly,
    pub host: String,
    pub log: WireLog,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireEvent {
    pub provider: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireFly {
    pub app: WireApp,
    pub region: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireApp {
    pub instance: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireLog {
    pub level: String,
}

/// A canonical entry together with its parsed instant and owning app.
///
/// The instant drives ordering and window checks inside the archive merge;
/// the app name is kept for filtering since `LogEntry` has no app field.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub at: DateTime<Utc>,
    pub app: String,
    pub entry: LogEntry,
}

impl WireRecord {
    pub fn into_record(self) -> Result<DecodedRecord, WireError> {
        let at = parse_wire_timestamp(&self.timestamp).ok_or_else(|| WireError::Timestamp {
            value: self.timestamp.clone(),
        })?;

        let instance = if self.fly.app.instance.is_empty() {
            self.host
        } else {
            self.fly.app.instance
        };

        let entry = LogEntry {
            level: self.log.level,
            instance: instance.clone(),
            region: self.fly.region.clone(),
            message: self.message,
            timestamp: at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            meta: Meta {
                instance,
                region: self.fly.region,
                event: EventMeta {
                    provider: self.event.provider,
                },
                ..Default::default()
            },
        };

        Ok(DecodedRecord {
            at,
            app: self.fly.app.name,
            entry,
        })
    }
}

/// Parse a wire timestamp. Hive format first, RFC3339 as a fallback for
/// objects written before the archiver switched formats.
pub fn parse_wire_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, HIVE_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode one NDJSON line into a record, logging and dropping anything malformed.
pub fn decode_line(line: &str) -> Option<DecodedRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let decoded = serde_json::from_str::<WireRecord>(line)
        .map_err(WireError::from)
        .and_then(WireRecord::into_record);

    match decoded {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable wire record");
            None
        }
    }
}
