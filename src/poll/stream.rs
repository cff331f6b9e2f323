use super::backoff::Backoff;
use super::fetcher::{FetchError, LogFetcher, LogPage};
use crate::config::types::PollingConfig;
use crate::stream::{entry_channel, EntrySink, EntryStream, LogOptions, LogStream, LogStreamError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Tuning for the live-tail poll loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub min_wait: Duration,
    pub max_backoff: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            min_wait: config.min_wait,
            max_backoff: config.max_backoff,
            max_consecutive_errors: config.max_consecutive_errors.max(1),
        }
    }
}

/// Live tail built on repeated calls to a paginated fetch API.
///
/// Only one request is in flight at a time. Entries are emitted in the order
/// the API returns them; no reordering happens across pages.
#[derive(Clone)]
pub struct PollingStream {
    fetcher: Arc<dyn LogFetcher>,
    settings: PollSettings,
}

impl PollingStream {
    pub fn new(fetcher: Arc<dyn LogFetcher>, settings: PollSettings) -> Self {
        Self { fetcher, settings }
    }
}

impl LogStream for PollingStream {
    fn stream(&self, cancel: CancellationToken, opts: LogOptions) -> EntryStream {
        let (sink, stream) = entry_channel(cancel);
        let fetcher = self.fetcher.clone();
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let result = poll_loop(fetcher.as_ref(), &settings, &opts, &sink).await;
            sink.finish(result);
        });

        stream
    }
}

async fn poll_loop(
    fetcher: &dyn LogFetcher,
    settings: &PollSettings,
    opts: &LogOptions,
    sink: &EntrySink,
) -> Result<(), LogStreamError> {
    let cancel = sink.cancel_token();
    let max = opts
        .max_backoff
        .filter(|d| !d.is_zero())
        .unwrap_or(settings.max_backoff);
    let mut backoff = Backoff::new(settings.min_wait, max);

    let Some(app_name) = opts.app_filter() else {
        return Err(LogStreamError::InvalidOptions(
            "live tail requires an app name".to_string(),
        ));
    };
    let region = opts.region_filter().unwrap_or_default();
    let instance = opts.instance_filter().unwrap_or_default();

    let mut next_token = String::new();
    let mut consecutive_errors = 0u32;

    loop {
        wait(cancel, backoff.current()).await?;

        let fetched: Result<LogPage, FetchError> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LogStreamError::Cancelled),
            fetched = fetcher.fetch(app_name, &next_token, region, instance) => fetched,
        };

        match fetched {
            Ok(page) if page.entries.is_empty() => {
                consecutive_errors = 0;
                let delay = backoff.next();
                trace!(app = %app_name, delay_ms = delay.as_millis(), "No new log entries");
            }
            Ok(page) => {
                consecutive_errors = 0;
                backoff.reset();
                if let Some(token) = page.next_token {
                    next_token = token;
                }

                trace!(app = %app_name, count = page.entries.len(), "Fetched log entries");
                for entry in page.entries {
                    sink.send(entry).await?;
                }
            }
            Err(e) if e.is_fatal() => {
                return Err(e.into());
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= settings.max_consecutive_errors {
                    warn!(
                        app = %app_name,
                        attempts = consecutive_errors,
                        error = %e,
                        "Giving up on log polling"
                    );
                    return Err(e.into());
                }

                let delay = backoff.next();
                warn!(
                    app = %app_name,
                    attempt = consecutive_errors,
                    backoff_ms = delay.as_millis(),
                    error = %e,
                    "Log fetch failed, retrying"
                );
            }
        }
    }
}

async fn wait(cancel: &CancellationToken, delay: Duration) -> Result<(), LogStreamError> {
    if delay.is_zero() {
        if cancel.is_cancelled() {
            return Err(LogStreamError::Cancelled);
        }
        return Ok(());
    }

    debug!(delay_ms = delay.as_millis(), "Waiting before next poll");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LogStreamError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
