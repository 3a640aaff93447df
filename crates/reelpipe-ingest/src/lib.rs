//! # reelpipe-ingest
//!
//! Turns a user-supplied reference into raw media bytes.
//!
//! - [`SourceReference`]: syntactic validation and canonicalisation of
//!   direct URLs, Instagram post/reel URLs and Google Drive share links
//! - [`RetryPolicy`]: bounded exponential backoff for transient failures
//! - [`HttpFetcher`]: the [`Fetcher`] implementation, with a process-wide
//!   rate limit, request timeout, size cap and optional raw logging
//! - [`YtDlpExtractor`]: downloads platform pages through `yt-dlp`

pub mod extractor;
pub mod fetcher;
pub mod reference;
pub mod retry;

pub use extractor::{ExtractorSettings, YtDlpExtractor};
pub use fetcher::{FetchSettings, Fetcher, HttpFetcher, DEFAULT_USER_AGENT};
pub use reference::SourceReference;
pub use retry::RetryPolicy;
