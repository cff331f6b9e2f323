//! Historical logs from the compressed object archive.
//!
//! Each archive object covers a five minute batch for one organization. A
//! request lists the hours overlapping its window, then merges every
//! overlapping object into one time-ordered stream while keeping at most
//! `target_concurrency` objects decoding at once.

pub mod layout;
pub mod merge;
pub(crate) mod object;
pub mod store;

pub use layout::{batch_window, hour_prefixes, object_path, BatchWindow};
pub use merge::{MergeSettings, MergeStats};

use crate::config::types::ArchiveConfig;
use crate::stream::{entry_channel, EntryStream, LogOptions, LogStream, LogStreamError};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use merge::MergeSession;
use object::{ArchiveObject, RecordFilter};
use object_store::ObjectStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// `LogStream` over the time-bucketed log archive.
#[derive(Clone)]
pub struct ArchiveStream {
    store: Arc<dyn ObjectStore>,
    settings: MergeSettings,
}

impl ArchiveStream {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            settings: MergeSettings::default(),
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> object_store::Result<Self> {
        let store = store::build_store(config)?;
        Ok(Self::new(store).with_settings(MergeSettings::from(config)))
    }

    pub fn with_settings(mut self, settings: MergeSettings) -> Self {
        self.settings = MergeSettings {
            target_concurrency: settings.target_concurrency.max(1),
            object_buffer: settings.object_buffer.max(1),
        };
        self
    }

    pub fn settings(&self) -> MergeSettings {
        self.settings
    }

    /// Like [`LogStream::stream`], also returning live merge counters.
    pub fn stream_with_stats(
        &self,
        cancel: CancellationToken,
        opts: LogOptions,
    ) -> (EntryStream, watch::Receiver<MergeStats>) {
        let (sink, stream) = entry_channel(cancel);
        let (stats_tx, stats_rx) = watch::channel(MergeStats::default());
        let store = self.store.clone();
        let settings = self.settings;

        tokio::spawn(async move {
            let result = async {
                let (start, end, org_id) = archive_window(&opts)?;
                let objects =
                    discover(store.as_ref(), org_id, start, end, sink.cancel_token()).await?;

                info!(
                    org_id = org_id,
                    objects = objects.len(),
                    start = %start,
                    end = %end,
                    "Merging archived logs"
                );

                let filter = RecordFilter::new(opts, start, end);
                let session = MergeSession::new(store, settings, filter, &sink, objects, stats_tx);
                let stats = session.run().await?;

                info!(
                    records = stats.records_emitted,
                    objects_failed = stats.objects_failed,
                    evictions = stats.evictions,
                    peak_open = stats.peak_open,
                    "Archive merge complete"
                );
                Ok::<(), LogStreamError>(())
            }
            .await;
            sink.finish(result);
        });

        (stream, stats_rx)
    }
}

impl LogStream for ArchiveStream {
    fn stream(&self, cancel: CancellationToken, opts: LogOptions) -> EntryStream {
        self.stream_with_stats(cancel, opts).0
    }
}

fn archive_window(opts: &LogOptions) -> Result<(DateTime<Utc>, DateTime<Utc>, u64), LogStreamError> {
    let (Some(start), Some(end)) = (opts.start, opts.end) else {
        return Err(LogStreamError::InvalidOptions(
            "archive retrieval requires both start and end".to_string(),
        ));
    };
    let Some(org_id) = opts.org_id else {
        return Err(LogStreamError::InvalidOptions(
            "archive retrieval requires an organization id".to_string(),
        ));
    };
    if start > end {
        return Err(LogStreamError::InvalidOptions(format!(
            "start {} is after end {}",
            start, end
        )));
    }
    Ok((start, end, org_id))
}

/// List every object whose batch overlaps `[start, end]`, earliest first.
async fn discover(
    store: &dyn ObjectStore,
    org_id: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Vec<ArchiveObject>, LogStreamError> {
    let mut objects = Vec::new();

    for prefix in hour_prefixes(org_id, start, end) {
        let mut listing = store.list(Some(&prefix));
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LogStreamError::Cancelled),
                next = listing.try_next() => next,
            };
            let Some(meta) = next.map_err(|e| LogStreamError::Listing(e.to_string()))? else {
                break;
            };

            let Some(window) = batch_window(&meta.location) else {
                debug!(key = %meta.location, "Ignoring archive key without batch epoch");
                continue;
            };
            if !window.overlaps(start, end) {
                continue;
            }
            objects.push(ArchiveObject::new(meta.location, window));
        }
    }

    objects.sort_by(|a, b| a.window.start.cmp(&b.window.start));
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_archive_window_requires_fields() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 13, 0, 0).unwrap();

        let missing_org = LogOptions {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        };
        assert!(matches!(
            archive_window(&missing_org),
            Err(LogStreamError::InvalidOptions(_))
        ));

        let inverted = LogOptions {
            start: Some(end),
            end: Some(start),
            org_id: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            archive_window(&inverted),
            Err(LogStreamError::InvalidOptions(_))
        ));

        let valid = LogOptions {
            start: Some(start),
            end: Some(end),
            org_id: Some(1),
            ..Default::default()
        };
        assert_eq!(archive_window(&valid).unwrap(), (start, end, 1));
    }
}
