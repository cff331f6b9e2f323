pub mod wire;

pub use wire::{decode_line, DecodedRecord, WireError, WireRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single application log line as handed to consumers.
///
/// `timestamp` is always RFC3339 and is the sort key for every stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    pub level: String,
    pub instance: String,
    pub region: String,
    pub message: String,
    pub timestamp: String,
    pub meta: Meta,
}

impl LogEntry {
    /// Parse the RFC3339 timestamp into an absolute instant.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Severity used for rendering; unknown or empty levels render as "error".
    pub fn display_level(&self) -> &str {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "notice" | "warn" | "warning" | "error" | "critical"
            | "fatal" => &self.level,
            _ => "error",
        }
    }
}

/// Side-channel fields consumed by renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub instance: String,
    pub region: String,
    pub event: EventMeta,
    pub http: HttpMeta,
    pub error: ErrorMeta,
    pub url: UrlMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventMeta {
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpMeta {
    pub request: HttpRequestMeta,
    pub response: HttpResponseMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRequestMeta {
    pub id: String,
    pub method: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpResponseMeta {
    pub status_code: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorMeta {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlMeta {
    pub full: String,
}
