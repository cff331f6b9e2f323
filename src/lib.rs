//! Retrieval of application logs from two backends behind one streaming
//! interface: a paginated live-tail API and a time-bucketed archive of
//! compressed NDJSON objects in S3-compatible storage.

pub mod archive;
pub mod cli;
pub mod config;
pub mod entry;
pub mod poll;
pub mod sequencer;
pub mod stream;

pub use archive::ArchiveStream;
pub use entry::LogEntry;
pub use poll::PollingStream;
pub use stream::{EntryStream, LogOptions, LogStream, LogStreamError};
