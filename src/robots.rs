//! Per-host robots.txt policy cache.
//!
//! An `IndexMap`-keyed-by-origin cache wraps `robotstxt::DefaultMatcher`,
//! with a tagged three-state entry (`Unknown` / `NoPolicy` / `Allowed`)
//! instead of a plain `Option` so a pre-fetch miss is distinguishable from
//! "we tried and there's no policy".

use std::time::Duration;

use indexmap::IndexMap;
use robotstxt::DefaultMatcher;
use tokio::sync::RwLock;
use url::Url;

use crate::error::RobotsFetchError;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-host cache entry. `Unknown` is never actually stored (a miss always
/// resolves to `NoPolicy` or `Allowed` before being inserted) but keeping it
/// as a real variant documents the pre-fetch state.
#[derive(Debug, Clone)]
enum RobotsEntry {
    #[allow(dead_code)]
    Unknown,
    NoPolicy,
    Allowed(String),
}

/// Per-host `robots.txt` cache, read/write-locked to permit many concurrent
/// readers.
pub struct RobotsCache {
    client: reqwest::Client,
    cache: RwLock<IndexMap<String, RobotsEntry>>,
    ignore_robots: bool,
    user_agent: String,
}

impl RobotsCache {
    /// `client` is always a dedicated plain-HTTP client, never the
    /// configurable fetcher, to avoid recursive browser overhead when the
    /// scheduler is running in browser mode.
    pub fn new(user_agent: impl Into<String>, ignore_robots: bool) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("crawlkeeper-robots/1.0")
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .build()
            .expect("robots.txt http client must build with static config");
        RobotsCache {
            client,
            cache: RwLock::new(IndexMap::new()),
            ignore_robots,
            user_agent: user_agent.into(),
        }
    }

    /// True if robots are ignored by config, the host has no policy, or
    /// the matched group permits the path; otherwise false.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        if self.ignore_robots {
            return true;
        }
        let Some(host) = url.host_str() else {
            return true;
        };
        let key = format!("{}://{}", url.scheme(), host);

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                return self.check(entry, url);
            }
        }

        let entry = self.fetch_and_parse(&key).await;
        let mut cache = self.cache.write().await;
        // Another task may have raced us to the write lock; keep whichever
        // landed first so repeated misses never occur for the same host.
        let entry = cache.entry(key).or_insert(entry).clone();
        self.check(&entry, url)
    }

    fn check(&self, entry: &RobotsEntry, url: &Url) -> bool {
        match entry {
            RobotsEntry::Unknown => true,
            RobotsEntry::NoPolicy => true,
            RobotsEntry::Allowed(content) => DefaultMatcher::default()
                .one_agent_allowed_by_robots(content, &self.user_agent, url.as_str()),
        }
    }

    async fn fetch_and_parse(&self, origin: &str) -> RobotsEntry {
        match self.fetch(origin).await {
            Ok(body) => {
                tracing::debug!(origin, bytes = body.len(), "cached robots.txt");
                RobotsEntry::Allowed(body)
            }
            Err(e) => {
                tracing::debug!(origin, error = %e, "treating as no robots policy");
                RobotsEntry::NoPolicy
            }
        }
    }

    async fn fetch(&self, origin: &str) -> Result<String, RobotsFetchError> {
        let url = format!("{origin}/robots.txt");
        let resp = self.client.get(&url).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(RobotsFetchError::Status(resp.status()));
        }
        Ok(resp.text().await?)
    }

    pub async fn cached_hosts(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ignore_robots_always_allows() {
        let cache = RobotsCache::new("TestBot", true);
        let url = Url::parse("https://example.invalid/secret").unwrap();
        assert!(cache.is_allowed(&url).await);
        // No network call should have been made or cached.
        assert_eq!(cache.cached_hosts().await, 0);
    }

    #[test]
    fn unreachable_host_treated_as_no_policy_allows() {
        let entry = RobotsEntry::NoPolicy;
        let url = Url::parse("https://example.com/anything").unwrap();
        let cache = RobotsCache::new("TestBot", false);
        assert!(cache.check(&entry, &url));
    }

    #[test]
    fn allowed_entry_respects_disallow_rules() {
        let content = "User-agent: *\nDisallow: /private/\n".to_string();
        let entry = RobotsEntry::Allowed(content);
        let cache = RobotsCache::new("TestBot", false);
        let allowed_url = Url::parse("https://example.com/public").unwrap();
        let blocked_url = Url::parse("https://example.com/private/x").unwrap();
        assert!(cache.check(&entry, &allowed_url));
        assert!(!cache.check(&entry, &blocked_url));
    }
}
