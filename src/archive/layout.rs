//! Object store layout of the log archive.
//!
//! Objects live at `logs/org_id={org}/date={YYYY-MM-DD}/hour={HH}/{epoch}-{suffix}`
//! where `epoch` is the unix second at which the object's five minute batch
//! ended.

use chrono::{DateTime, Duration, Utc};
use object_store::path::Path;

/// Seconds of logs covered by one archive object.
pub const BATCH_SPAN_SECS: i64 = 300;

/// Half-open `[start, end)` interval covered by one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BatchWindow {
    pub fn ending_at(end: DateTime<Utc>) -> Self {
        Self {
            start: end - Duration::seconds(BATCH_SPAN_SECS),
            end,
        }
    }

    /// Whether this batch may hold records inside the inclusive `[from, to]`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        !(self.end < from || self.start > to)
    }
}

/// Hour prefixes to list for a request window.
///
/// The lower bound is pulled back by one batch span so batches that end
/// after `from` but started before it are discovered.
pub fn hour_prefixes(org_id: u64, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Path> {
    let lookback = from - Duration::seconds(BATCH_SPAN_SECS);
    let (Some(mut hour), Some(last)) = (truncate_to_hour(lookback), truncate_to_hour(to)) else {
        return Vec::new();
    };

    let mut prefixes = Vec::new();
    while hour <= last {
        prefixes.push(Path::from(format!(
            "logs/org_id={}/{}",
            org_id,
            hour.format("date=%Y-%m-%d/hour=%H")
        )));
        hour += Duration::hours(1);
    }
    prefixes
}

/// Window of the batch stored under `location`, from the leading epoch of its
/// file name. `None` for keys that don't follow the layout.
pub fn batch_window(location: &Path) -> Option<BatchWindow> {
    let filename = location.filename()?;
    let epoch: i64 = filename.split('-').next()?.parse().ok()?;
    let end = DateTime::from_timestamp(epoch, 0)?;
    Some(BatchWindow::ending_at(end))
}

/// Full key of an archive object.
pub fn object_path(org_id: u64, batch_end: DateTime<Utc>, suffix: &str) -> Path {
    Path::from(format!(
        "logs/org_id={}/{}/{}-{}",
        org_id,
        batch_end.format("date=%Y-%m-%d/hour=%H"),
        batch_end.timestamp(),
        suffix
    ))
}

fn truncate_to_hour(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0)
}
