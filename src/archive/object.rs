use super::layout::BatchWindow;
use crate::entry::{decode_line, DecodedRecord};
use crate::stream::LogOptions;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Events sent from a decode pipeline to the merge coordinator.
#[derive(Debug)]
pub(crate) enum ObjectEvent {
    Record(DecodedRecord),
    Failed(String),
}

/// Per-record admission rules derived from the request.
#[derive(Debug, Clone)]
pub(crate) struct RecordFilter {
    opts: LogOptions,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    Keep,
    Drop,
    /// Past the window; nothing later in the object can qualify.
    Stop,
}

impl RecordFilter {
    pub fn new(opts: LogOptions, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { opts, start, end }
    }

    pub fn admit(&self, record: &DecodedRecord) -> Admission {
        if record.at > self.end {
            return Admission::Stop;
        }
        if record.at < self.start {
            return Admission::Drop;
        }
        let entry = &record.entry;
        if !self.opts.matches(&record.app, &entry.instance, &entry.region) {
            return Admission::Drop;
        }
        Admission::Keep
    }
}

/// One archive object tracked by the merge.
#[derive(Debug)]
pub(crate) struct ArchiveObject {
    pub location: Path,
    pub window: BatchWindow,
    /// Pulled from the pipeline but not yet emitted.
    pub buffered: Option<DecodedRecord>,
    pub pipeline: Option<Pipeline>,
    /// Records pulled so far; a reopened pipeline skips this many.
    pub consumed: usize,
    pub ever_opened: bool,
}

impl ArchiveObject {
    pub fn new(location: Path, window: BatchWindow) -> Self {
        Self {
            location,
            window,
            buffered: None,
            pipeline: None,
            consumed: 0,
            ever_opened: false,
        }
    }

    /// Lower bound on the timestamp of anything this object has yet to emit.
    pub fn key(&self) -> DateTime<Utc> {
        match &self.buffered {
            Some(record) => record.at,
            None => self.window.start,
        }
    }

    pub fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }
}

/// A running fetch-and-decode task for one object.
///
/// Dropping a `Pipeline` cancels its task without waiting for it; use
/// [`Pipeline::shutdown`] when the task must be gone before going on.
#[derive(Debug)]
pub(crate) struct Pipeline {
    events: mpsc::Receiver<ObjectEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Pipeline {
    pub async fn recv(&mut self) -> Option<ObjectEvent> {
        self.events.recv().await
    }

    /// Stop the task and wait until its fetch and decoder are released.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.events.close();
        let _ = (&mut self.task).await;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start fetching and decoding one object.
///
/// The response body is streamed: decompression and line parsing run on the
/// blocking pool, reading the body as it arrives and pushing into a bounded
/// channel, so a slow consumer stalls the download instead of growing a
/// buffer.
pub(crate) fn spawn_pipeline(
    store: Arc<dyn ObjectStore>,
    location: Path,
    filter: Arc<RecordFilter>,
    skip: usize,
    capacity: usize,
    cancel: CancellationToken,
) -> Pipeline {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let cancel = task_cancel;
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            fetched = store.get(&location) => fetched,
        };

        let result = match fetched {
            Ok(result) => result,
            Err(e) => {
                debug!(key = %location, error = %e, "Failed to fetch archive object");
                let _ = tx.send(ObjectEvent::Failed(e.to_string())).await;
                return;
            }
        };

        trace!(key = %location, size = result.meta.size, skip = skip, "Streaming archive object");

        let body = StreamReader::new(
            result
                .into_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        );
        let reader = SyncIoBridge::new(body);

        let key = location.to_string();
        let decoded = tokio::task::spawn_blocking(move || {
            decode_body(reader, &filter, skip, &tx, &cancel)
        })
        .await;

        match decoded {
            Ok(emitted) => debug!(key = %key, emitted = emitted, "Archive object pipeline finished"),
            Err(e) => debug!(key = %key, error = %e, "Archive object pipeline aborted"),
        }
    });

    Pipeline {
        events: rx,
        cancel,
        task,
    }
}

/// Decompress a zstd NDJSON body and push admitted records.
///
/// Returns the number of records sent. Malformed lines are skipped; a broken
/// compressed stream or a failed read ends the object with a `Failed` event.
pub(crate) fn decode_body<R: Read>(
    body: R,
    filter: &RecordFilter,
    skip: usize,
    tx: &mpsc::Sender<ObjectEvent>,
    cancel: &CancellationToken,
) -> usize {
    let decoder = match zstd::stream::read::Decoder::new(body) {
        Ok(decoder) => decoder,
        Err(e) => {
            let _ = tx.blocking_send(ObjectEvent::Failed(format!("zstd init: {}", e)));
            return 0;
        }
    };

    let mut skipped = 0usize;
    let mut sent = 0usize;

    for line in BufReader::new(decoder).split(b'\n') {
        if cancel.is_cancelled() {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = tx.blocking_send(ObjectEvent::Failed(format!("decompress: {}", e)));
                break;
            }
        };

        let Ok(text) = std::str::from_utf8(&line) else {
            debug!("Skipping non-UTF-8 archive line");
            continue;
        };
        let Some(record) = decode_line(text) else {
            continue;
        };

        match filter.admit(&record) {
            Admission::Keep => {}
            Admission::Drop => continue,
            Admission::Stop => break,
        }

        if skipped < skip {
            skipped += 1;
            continue;
        }

        if tx.blocking_send(ObjectEvent::Record(record)).is_err() {
            break;
        }
        sent += 1;
    }

    sent
}
