use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session configuration shared by every `LogStream` implementation.
///
/// Filters left as `None` (or set to an empty string) impose no constraint.
/// Live-tail sources ignore `start`, `end` and `org_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub app_name: Option<String>,
    pub vm_id: Option<String>,
    pub region_code: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub org_id: Option<u64>,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Option<Duration>,
}

impl LogOptions {
    pub fn for_app(app_name: impl Into<String>) -> Self {
        Self {
            app_name: Some(app_name.into()),
            ..Default::default()
        }
    }

    pub fn app_filter(&self) -> Option<&str> {
        non_empty(&self.app_name)
    }

    pub fn instance_filter(&self) -> Option<&str> {
        non_empty(&self.vm_id)
    }

    pub fn region_filter(&self) -> Option<&str> {
        non_empty(&self.region_code)
    }

    /// True if a record with these coordinates passes every configured filter.
    pub fn matches(&self, app: &str, instance: &str, region: &str) -> bool {
        self.app_filter().map_or(true, |want| want == app)
            && self.instance_filter().map_or(true, |want| want == instance)
            && self.region_filter().map_or(true, |want| want == region)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
