pub mod backoff;
pub mod fetcher;
pub mod stream;

pub use backoff::Backoff;
pub use fetcher::{FetchError, HttpLogFetcher, LogFetcher, LogPage};
pub use stream::{PollSettings, PollingStream};
