use super::object::{spawn_pipeline, ArchiveObject, ObjectEvent, RecordFilter};
use crate::config::types::{ArchiveConfig, DEFAULT_OBJECT_BUFFER, DEFAULT_TARGET_CONCURRENCY};
use crate::entry::DecodedRecord;
use crate::sequencer::MinHeap;
use crate::stream::{EntrySink, LogStreamError};
use chrono::{DateTime, Utc};
use object_store::ObjectStore;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Budget for one merge session.
#[derive(Debug, Clone, Copy)]
pub struct MergeSettings {
    /// Maximum number of objects with a live decode pipeline.
    pub target_concurrency: usize,
    /// Capacity of each object's record channel.
    pub object_buffer: usize,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            target_concurrency: DEFAULT_TARGET_CONCURRENCY,
            object_buffer: DEFAULT_OBJECT_BUFFER,
        }
    }
}

impl From<&ArchiveConfig> for MergeSettings {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            target_concurrency: config.target_concurrency.max(1),
            object_buffer: config.object_buffer.max(1),
        }
    }
}

/// Counters for one merge session, published as the merge progresses.
///
/// Failed objects are otherwise invisible to the stream contract, so
/// `objects_failed` is the place to look for gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub objects_listed: usize,
    /// Pipelines started, including reopens after eviction.
    pub objects_opened: usize,
    pub objects_failed: usize,
    pub evictions: usize,
    pub peak_open: usize,
    pub records_emitted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapSlot {
    key: DateTime<Utc>,
    index: usize,
}

/// Streaming k-way merge over archive objects.
///
/// Owns the heap and every object; decode pipelines only write to their own
/// channel. The heap key of an object is its buffered record's timestamp, or
/// its batch start when nothing is buffered, so the heap minimum is always a
/// lower bound on everything not yet emitted.
pub(crate) struct MergeSession<'a> {
    store: Arc<dyn ObjectStore>,
    settings: MergeSettings,
    filter: Arc<RecordFilter>,
    sink: &'a EntrySink,
    objects: Vec<ArchiveObject>,
    heap: MinHeap<HeapSlot>,
    open: HashSet<usize>,
    never_opened: VecDeque<usize>,
    stats: MergeStats,
    stats_tx: watch::Sender<MergeStats>,
}

impl<'a> MergeSession<'a> {
    /// `objects` should be sorted by batch start so the eager opens and
    /// backfills pick the earliest batches first.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        settings: MergeSettings,
        filter: RecordFilter,
        sink: &'a EntrySink,
        objects: Vec<ArchiveObject>,
        stats_tx: watch::Sender<MergeStats>,
    ) -> Self {
        let mut heap = MinHeap::with_capacity(objects.len());
        for (index, object) in objects.iter().enumerate() {
            heap.insert(HeapSlot {
                key: object.key(),
                index,
            });
        }

        let stats = MergeStats {
            objects_listed: objects.len(),
            ..Default::default()
        };

        Self {
            store,
            settings,
            filter: Arc::new(filter),
            sink,
            never_opened: (0..objects.len()).collect(),
            objects,
            heap,
            open: HashSet::new(),
            stats,
            stats_tx,
        }
    }

    pub async fn run(mut self) -> Result<MergeStats, LogStreamError> {
        for _ in 0..self.settings.target_concurrency {
            if !self.backfill().await {
                break;
            }
        }
        self.publish();

        let result = self.merge_loop().await;
        self.publish();
        result.map(|()| self.stats)
    }

    async fn merge_loop(&mut self) -> Result<(), LogStreamError> {
        while let Some(HeapSlot { index, .. }) = self.heap.pop_min() {
            if let Some(record) = self.objects[index].buffered.take() {
                self.sink.send(record.entry).await?;
                self.stats.records_emitted += 1;
            }

            if !self.objects[index].is_open() {
                self.open(index).await;
            }

            match self.pull(index).await? {
                Some(record) => {
                    let object = &mut self.objects[index];
                    object.consumed += 1;
                    let key = record.at;
                    object.buffered = Some(record);
                    self.heap.insert(HeapSlot { key, index });
                }
                None => {
                    self.retire(index).await;
                    self.backfill().await;
                }
            }
        }
        Ok(())
    }

    /// Next record from an open object, or `None` once it is exhausted.
    async fn pull(&mut self, index: usize) -> Result<Option<DecodedRecord>, LogStreamError> {
        let sink = self.sink;
        let cancel = sink.cancel_token();
        let object = &mut self.objects[index];
        let Some(pipeline) = object.pipeline.as_mut() else {
            return Ok(None);
        };

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LogStreamError::Cancelled),
            event = pipeline.recv() => event,
        };

        match event {
            Some(ObjectEvent::Record(record)) => Ok(Some(record)),
            Some(ObjectEvent::Failed(reason)) => {
                warn!(
                    key = %object.location,
                    error = %reason,
                    "Archive object failed, continuing without it"
                );
                self.stats.objects_failed += 1;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Start a pipeline for `index`, evicting another object if the budget
    /// is spent. The evicted pipeline is fully stopped before the new one
    /// starts fetching.
    async fn open(&mut self, index: usize) {
        if self.open.len() >= self.settings.target_concurrency {
            self.evict(index).await;
        }

        let object = &mut self.objects[index];
        let pipeline = spawn_pipeline(
            self.store.clone(),
            object.location.clone(),
            self.filter.clone(),
            object.consumed,
            self.settings.object_buffer,
            self.sink.cancel_token().child_token(),
        );
        object.pipeline = Some(pipeline);
        object.ever_opened = true;

        self.open.insert(index);
        self.stats.objects_opened += 1;
        self.stats.peak_open = self.stats.peak_open.max(self.open.len());
        self.publish();
    }

    /// Stop the pipeline of the open object furthest from being needed.
    ///
    /// The evicted object keeps its buffered record, so its heap key stays
    /// exact; on reopen its pipeline skips what was already consumed.
    async fn evict(&mut self, keep: usize) {
        let victim = self
            .open
            .iter()
            .copied()
            .filter(|&i| i != keep)
            .max_by_key(|&i| (self.objects[i].key(), i));

        if let Some(victim) = victim {
            let object = &mut self.objects[victim];
            debug!(
                key = %object.location,
                consumed = object.consumed,
                "Evicting archive object to stay within concurrency budget"
            );
            let pipeline = object.pipeline.take();
            self.open.remove(&victim);
            self.stats.evictions += 1;
            if let Some(pipeline) = pipeline {
                pipeline.shutdown().await;
            }
        }
    }

    async fn retire(&mut self, index: usize) {
        let object = &mut self.objects[index];
        let pipeline = object.pipeline.take();
        self.open.remove(&index);
        debug!(
            key = %object.location,
            records = object.consumed,
            "Archive object exhausted"
        );
        if let Some(pipeline) = pipeline {
            pipeline.shutdown().await;
        }
        self.publish();
    }

    /// Open the earliest object that has never been opened, if a slot is free.
    async fn backfill(&mut self) -> bool {
        if self.open.len() >= self.settings.target_concurrency {
            return false;
        }
        while let Some(index) = self.never_opened.pop_front() {
            if !self.objects[index].ever_opened {
                self.open(index).await;
                return true;
            }
        }
        false
    }

    fn publish(&self) {
        self.stats_tx.send_replace(self.stats);
    }
}
