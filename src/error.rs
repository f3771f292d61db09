//! Typed errors for every fallible subsystem.
//!
//! Configuration errors are the only ones that propagate out of
//! [`crate::scheduler::Scheduler::start`]; everything else is folded into
//! metrics counters by the caller instead of bubbling up as `Err`.

use std::path::PathBuf;

/// Failures that abort a crawl before it fetches a single page.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("seed url is required")]
    MissingUrl,

    #[error("seed url '{0}' must use http or https")]
    UnsupportedScheme(String),

    #[error("seed url '{0}' could not be parsed: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("max_depth must be a positive integer, got {0}")]
    InvalidMaxDepth(i64),

    #[error("delay_ms must not be negative, got {0}")]
    NegativeDelay(i64),

    #[error("scope prefix '{0}' could not be parsed: {1}")]
    InvalidScopePrefix(String, url::ParseError),

    #[error("pagination is enabled but the fetch mode is not browser")]
    PaginationRequiresBrowser,

    #[error("pagination is enabled but no pagination selector was configured")]
    PaginationRequiresSelector,

    #[error("output directory '{0}' is not usable: {1}")]
    OutputDir(PathBuf, std::io::Error),
}

/// Failures encountered while talking to a page's `robots.txt`.
///
/// All variants are folded into [`RobotsEntry::NoPolicy`] by the cache —
/// this type exists to make the "why" observable in logs without it ever
/// propagating to callers.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RobotsFetchError {
    #[error("network error fetching robots.txt: {0}")]
    Network(#[from] reqwest::Error),

    #[error("robots.txt fetch returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Failures from a [`crate::fetcher::Fetcher::fetch`] call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("non-success status {0}")]
    Status(reqwest::StatusCode),

    #[error("browser-driven fetching is not available in this build")]
    BrowserFetcherUnavailable,
}

/// Failures from writing the durable frontier snapshot.
///
/// These are always logged at `warn` and never abort the crawl; this type
/// exists purely so the log message carries structure.
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("failed to read state file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse state file {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("failed to write state file {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("failed to serialize state: {0}")]
    Serialize(serde_json::Error),
}

/// Failures from writing page artifacts.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("failed to serialize page metadata: {0}")]
    Serialize(serde_json::Error),
}

/// Top-level error surfaced from [`crate::scheduler::Scheduler::start`].
///
/// Only startup/configuration and unrecoverable setup failures surface
/// here; everything encountered per-URL during the crawl is recorded in
/// metrics instead.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create output directory {0}: {1}")]
    OutputDir(PathBuf, std::io::Error),

    #[error("failed to load crawler state: {0}")]
    State(#[from] StateStoreError),
}
