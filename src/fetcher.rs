//! Fetch transport.
//!
//! A pooled `reqwest::Client` (bounded idle connections, bounded redirects)
//! sits behind the `Fetcher` trait so the scheduler never constructs a
//! transport directly — a browser-driven implementation is a second,
//! swappable implementation of the same seam.

use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

use crate::config::{AntiBotConfig, PaginationConfig};
use crate::error::FetchError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_MAX_IDLE_PER_HOST: usize = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_REDIRECTS: usize = 10;

/// What a successful fetch hands back to the scheduler.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub final_url: Url,
}

/// The fetch transport seam: the scheduler depends on this interface, not
/// a concrete client, so a browser-driven implementation can be substituted
/// without touching scheduling logic.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, user_agent: &str) -> Result<FetchResponse, FetchError>;

    /// Block until an interactive login completes or the caller gives up.
    /// Only meaningful for a browser-driven implementation; [`HttpFetcher`]
    /// never needs it, hence the no-op default.
    async fn wait_for_login(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Release any held resources (a browser session, a connection pool).
    /// The default no-op suits [`HttpFetcher`], whose pool is reclaimed on
    /// drop; [`BrowserFetcher`] overrides it once a real browser driver
    /// backs it.
    async fn close(&self) {}
}

/// Plain HTTP(S) fetcher: a single pooled `reqwest::Client`, bounded
/// redirects, a fixed per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("http fetcher client must build with static config");
        HttpFetcher { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, user_agent: &str) -> Result<FetchResponse, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = resp.url().clone();
        let body = resp.bytes().await?.to_vec();

        Ok(FetchResponse {
            status: status.as_u16(),
            content_type,
            body,
            final_url,
        })
    }
}

/// Browser-driven fetcher stub. Carries the anti-bot and pagination knobs
/// uninterpreted; a real implementation would drive a headless browser
/// behind this same trait.
pub struct BrowserFetcher {
    #[allow(dead_code)]
    anti_bot: AntiBotConfig,
    #[allow(dead_code)]
    pagination: PaginationConfig,
}

impl BrowserFetcher {
    pub fn new(anti_bot: AntiBotConfig, pagination: PaginationConfig) -> Self {
        BrowserFetcher {
            anti_bot,
            pagination,
        }
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, _url: &Url, _user_agent: &str) -> Result<FetchResponse, FetchError> {
        Err(FetchError::BrowserFetcherUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_fetcher_builds_with_expected_defaults() {
        let _fetcher = HttpFetcher::new();
    }

    #[tokio::test]
    async fn browser_fetcher_reports_unavailable() {
        let fetcher = BrowserFetcher::new(AntiBotConfig::default(), PaginationConfig::default());
        let url = Url::parse("https://example.com").unwrap();
        let err = fetcher.fetch(&url, "TestBot").await.unwrap_err();
        assert!(matches!(err, FetchError::BrowserFetcherUnavailable));
    }

    #[tokio::test]
    async fn fetcher_close_default_is_a_noop() {
        let fetcher = HttpFetcher::new();
        fetcher.close().await;
    }
}
