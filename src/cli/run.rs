use crate::archive::{ArchiveStream, MergeSettings};
use crate::config::parse::{load_config, ConfigError};
use crate::config::types::Config;
use crate::entry::LogEntry;
use crate::poll::{FetchError, HttpLogFetcher, PollSettings, PollingStream};
use crate::stream::{EntryStream, LogOptions, LogStream, LogStreamError};
use chrono::{DateTime, Utc};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create API client: {0}")]
    Client(#[from] FetchError),

    #[error("failed to open log archive: {0}")]
    Archive(#[from] object_store::Error),

    #[error("{0}")]
    Stream(#[from] LogStreamError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode entry: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Args)]
pub struct TailArgs {
    /// Application to tail
    #[arg(long)]
    pub app: String,

    /// Only show entries from this region
    #[arg(long)]
    pub region: Option<String>,

    /// Only show entries from this instance
    #[arg(long)]
    pub instance: Option<String>,

    /// Upper bound on the idle poll delay (e.g. 2s, 500ms)
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub max_backoff: Option<Duration>,
}

impl TailArgs {
    pub fn options(&self) -> LogOptions {
        LogOptions {
            region_code: self.region.clone(),
            vm_id: self.instance.clone(),
            max_backoff: self.max_backoff,
            ..LogOptions::for_app(self.app.clone())
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct HistoryArgs {
    /// Organization whose archive to read
    #[arg(long)]
    pub org: u64,

    /// Window start, RFC 3339
    #[arg(long, value_parser = parse_rfc3339)]
    pub start: DateTime<Utc>,

    /// Window end, RFC 3339 (inclusive)
    #[arg(long, value_parser = parse_rfc3339)]
    pub end: DateTime<Utc>,

    #[arg(long)]
    pub app: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub instance: Option<String>,

    /// Override archive.target_concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl HistoryArgs {
    pub fn options(&self) -> LogOptions {
        LogOptions {
            app_name: self.app.clone(),
            vm_id: self.instance.clone(),
            region_code: self.region.clone(),
            start: Some(self.start),
            end: Some(self.end),
            org_id: Some(self.org),
            max_backoff: None,
        }
    }
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// Load the config at `path`, or built-in defaults when no file was found.
pub fn load(path: Option<PathBuf>) -> Result<Config, CliError> {
    match path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Ok(load_config(&path)?)
        }
        None => {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

pub async fn tail(config: &Config, args: TailArgs) -> Result<(), CliError> {
    let fetcher = HttpLogFetcher::new(&config.api)?;
    if config.api.access_token.is_none() {
        warn!("No api.access_token configured, requests will be unauthenticated");
    }

    let source = PollingStream::new(Arc::new(fetcher), PollSettings::from(&config.polling));
    info!(app = %args.app, base_url = %config.api.base_url, "Tailing logs");

    let cancel = CancellationToken::new();
    let stream = source.stream(cancel.clone(), args.options());
    print_stream(stream, cancel).await
}

pub async fn history(config: &Config, args: HistoryArgs) -> Result<(), CliError> {
    let mut settings = MergeSettings::from(&config.archive);
    if let Some(concurrency) = args.concurrency {
        settings.target_concurrency = concurrency;
    }
    let source = ArchiveStream::from_config(&config.archive)?.with_settings(settings);

    let cancel = CancellationToken::new();
    let stream = source.stream(cancel.clone(), args.options());
    print_stream(stream, cancel).await
}

/// Drain `stream` to stdout as JSON lines until it ends or Ctrl-C.
async fn print_stream(mut stream: EntryStream, cancel: CancellationToken) -> Result<(), CliError> {
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupt received, stopping");
                interrupt.cancel();
            }
            _ = interrupt.cancelled() => {}
        }
    });
    let _stop = cancel.clone().drop_guard();

    let stdout = std::io::stdout();
    let mut count = 0usize;
    while let Some(entry) = stream.recv().await {
        let mut out = stdout.lock();
        if let Err(e) = write_entry(&mut out, &entry) {
            cancel.cancel();
            return Err(e);
        }
        count += 1;
    }

    info!(entries = count, "Log stream finished");
    match stream.err() {
        None | Some(LogStreamError::Cancelled) => Ok(()),
        Some(e) => Err(e.into()),
    }
}

/// Write one entry as a single JSON line and flush.
pub fn write_entry<W: Write>(out: &mut W, entry: &LogEntry) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, entry)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tail_options() {
        let args = TailArgs {
            app: "web".to_string(),
            region: Some("ord".to_string()),
            instance: None,
            max_backoff: Some(Duration::from_secs(2)),
        };
        let opts = args.options();
        assert_eq!(opts.app_filter(), Some("web"));
        assert_eq!(opts.region_filter(), Some("ord"));
        assert_eq!(opts.instance_filter(), None);
        assert_eq!(opts.max_backoff, Some(Duration::from_secs(2)));
        assert!(opts.start.is_none());
    }

    #[test]
    fn test_history_options() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 13, 0, 0).unwrap();
        let args = HistoryArgs {
            org: 42,
            start,
            end,
            app: None,
            region: None,
            instance: Some("abc123".to_string()),
            concurrency: Some(4),
        };
        let opts = args.options();
        assert_eq!(opts.org_id, Some(42));
        assert_eq!(opts.start, Some(start));
        assert_eq!(opts.end, Some(end));
        assert_eq!(opts.instance_filter(), Some("abc123"));
        assert_eq!(opts.app_filter(), None);
    }

    #[test]
    fn test_parse_rfc3339_normalizes_offset() {
        let parsed = parse_rfc3339("2025-03-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        assert!(parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_write_entry_is_one_line() {
        let entry = LogEntry {
            level: "info".to_string(),
            instance: "abc123".to_string(),
            region: "ord".to_string(),
            message: "hello\nworld".to_string(),
            timestamp: "2025-03-01T12:00:00Z".to_string(),
            ..Default::default()
        };

        let mut out = Vec::new();
        write_entry(&mut out, &entry).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches('\n').count(), 1);
        let decoded: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(decoded["message"], "hello\nworld");
        assert_eq!(decoded["region"], "ord");
    }
}
