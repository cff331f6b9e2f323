pub mod options;

pub use options::LogOptions;

use crate::entry::LogEntry;
use crate::poll::FetchError;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Session-terminal failures surfaced through [`EntryStream::err`].
#[derive(Debug, Clone, Error)]
pub enum LogStreamError {
    #[error("log stream cancelled")]
    Cancelled,

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to list archive objects: {0}")]
    Listing(String),

    #[error("invalid log options: {0}")]
    InvalidOptions(String),
}

/// A source of time-ordered log entries.
///
/// `stream` starts background work immediately and returns without blocking.
/// The returned sequence must be drained, dropped, or cancelled to release
/// that work. Each call is an independent, non-restartable pass.
pub trait LogStream: Send + Sync {
    fn stream(&self, cancel: CancellationToken, opts: LogOptions) -> EntryStream;
}

/// Capacity of the consumer-facing channel. Kept minimal so the coordinator
/// never runs ahead of the caller.
const OUTPUT_CAPACITY: usize = 1;

/// Lazy, singly-consumable sequence of entries plus its terminal error.
#[derive(Debug)]
pub struct EntryStream {
    rx: mpsc::Receiver<LogEntry>,
    outcome: Arc<OnceLock<LogStreamError>>,
}

impl EntryStream {
    /// Next entry, or `None` once the producer has finished.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }

    /// Terminal error of the session.
    ///
    /// Only meaningful after `recv` has returned `None`; before that the
    /// producer may still be running.
    pub fn err(&self) -> Option<LogStreamError> {
        self.outcome.get().cloned()
    }

    /// Drain every remaining entry into a vector.
    pub async fn collect_all(&mut self) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        while let Some(entry) = self.recv().await {
            entries.push(entry);
        }
        entries
    }
}

impl futures::Stream for EntryStream {
    type Item = LogEntry;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogEntry>> {
        self.rx.poll_recv(cx)
    }
}

/// Producer half held by a coordinating task.
#[derive(Debug)]
pub(crate) struct EntrySink {
    tx: mpsc::Sender<LogEntry>,
    outcome: Arc<OnceLock<LogStreamError>>,
    cancel: CancellationToken,
}

pub(crate) fn entry_channel(cancel: CancellationToken) -> (EntrySink, EntryStream) {
    let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
    let outcome = Arc::new(OnceLock::new());
    let sink = EntrySink {
        tx,
        outcome: outcome.clone(),
        cancel,
    };
    (sink, EntryStream { rx, outcome })
}

impl EntrySink {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Hand an entry to the consumer, waiting for room.
    ///
    /// A dropped consumer is treated the same as cancellation.
    pub async fn send(&self, entry: LogEntry) -> Result<(), LogStreamError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LogStreamError::Cancelled),
            sent = self.tx.send(entry) => sent.map_err(|_| LogStreamError::Cancelled),
        }
    }

    /// Record the session result and close the sequence.
    ///
    /// The first recorded error wins; the error is stored before the channel
    /// closes so a drained consumer always observes it.
    pub fn finish(self, result: Result<(), LogStreamError>) {
        if let Err(e) = result {
            match &e {
                LogStreamError::Cancelled => tracing::debug!("Log stream cancelled"),
                other => tracing::error!(error = %other, "Log stream terminated"),
            }
            let _ = self.outcome.set(e);
        }
        drop(self.tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            message: message.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_clean_finish_has_no_error() {
        let (sink, mut stream) = entry_channel(CancellationToken::new());

        tokio::spawn(async move {
            let result = async {
                sink.send(entry("one")).await?;
                sink.send(entry("two")).await
            }
            .await;
            sink.finish(result);
        });

        let entries = stream.collect_all().await;
        assert_eq!(entries.len(), 2);
        assert!(stream.err().is_none());
    }

    #[tokio::test]
    async fn test_error_visible_after_drain() {
        let (sink, mut stream) = entry_channel(CancellationToken::new());

        tokio::spawn(async move {
            let result = sink.send(entry("one")).await.and(Err(
                LogStreamError::Fetch(FetchError::NotFound("app web".to_string())),
            ));
            sink.finish(result);
        });

        assert_eq!(stream.recv().await.unwrap().message, "one");
        assert!(stream.recv().await.is_none());
        assert!(matches!(
            stream.err(),
            Some(LogStreamError::Fetch(FetchError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_send_observes_cancellation() {
        let cancel = CancellationToken::new();
        let (sink, stream) = entry_channel(cancel.clone());

        // Fill the only slot so the next send has to wait
        sink.send(entry("buffered")).await.unwrap();
        cancel.cancel();

        let result = sink.send(entry("blocked")).await;
        assert!(matches!(result, Err(LogStreamError::Cancelled)));
        drop(stream);
    }

    #[tokio::test]
    async fn test_implements_futures_stream() {
        let (sink, stream) = entry_channel(CancellationToken::new());

        tokio::spawn(async move {
            let result = sink.send(entry("a")).await;
            sink.finish(result);
        });

        let messages: Vec<String> = stream.map(|e| e.message).collect().await;
        assert_eq!(messages, vec!["a".to_string()]);
    }
}
