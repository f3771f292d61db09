//! Crawl configuration.
//!
//! `Config` is immutable once built; a consuming `ConfigBuilder` assembles
//! and validates it from CLI flags or caller-constructed defaults.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Which [`crate::fetcher::Fetcher`] implementation the scheduler should
/// construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Http,
    Browser,
}

/// Anti-fingerprinting knobs consumed only by the (out of core scope)
/// browser fetcher. The scheduler carries these without interpreting them.
#[derive(Debug, Clone, Default)]
pub struct AntiBotConfig {
    pub headless: bool,
    pub randomize_user_agent: bool,
    pub wait_for_interactive_login: bool,
}

/// Pagination knobs consumed only by the browser fetcher.
#[derive(Debug, Clone, Default)]
pub struct PaginationConfig {
    pub enabled: bool,
    pub next_page_selector: Option<String>,
    pub max_pages: Option<usize>,
}

/// URL-normalization switches.
#[derive(Debug, Clone, Default)]
pub struct NormalizationConfig {
    pub lowercase_path: bool,
}

/// Immutable crawl configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: Url,
    pub concurrent: bool,
    pub max_concurrent_requests: usize,
    pub delay: Duration,
    pub max_depth: u32,
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    pub scope_prefix: Option<Url>,
    pub exclude_extensions: Vec<String>,
    pub link_selectors: Vec<String>,
    pub min_content_length: usize,
    pub ignore_robots: bool,
    pub normalization: NormalizationConfig,
    pub fetch_mode: FetchMode,
    pub anti_bot: AntiBotConfig,
    pub pagination: PaginationConfig,
    pub user_agent: String,
    pub checkpoint_interval: u64,
    pub extract_content: bool,
    pub metrics_file: Option<PathBuf>,
}

pub const DEFAULT_USER_AGENT: &str = "CrawlkeeperBot/1.0";
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10;
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 100;
const QUEUE_EMPTY_POLL: Duration = Duration::from_millis(100);

impl Config {
    pub(crate) fn queue_empty_poll_interval(&self) -> Duration {
        QUEUE_EMPTY_POLL
    }
}

/// Builder for [`Config`]: every setter consumes and returns `self`.
pub struct ConfigBuilder {
    raw_url: Option<String>,
    concurrent: bool,
    max_concurrent_requests: usize,
    delay_ms: i64,
    max_depth: i64,
    output_dir: PathBuf,
    state_file: PathBuf,
    raw_scope_prefix: Option<String>,
    exclude_extensions: Vec<String>,
    link_selectors: Vec<String>,
    min_content_length: usize,
    ignore_robots: bool,
    normalization: NormalizationConfig,
    fetch_mode: FetchMode,
    anti_bot: AntiBotConfig,
    pagination: PaginationConfig,
    user_agent: String,
    checkpoint_interval: u64,
    extract_content: bool,
    metrics_file: Option<PathBuf>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            raw_url: None,
            concurrent: false,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            delay_ms: 0,
            max_depth: 5,
            output_dir: PathBuf::from("scraped_content"),
            state_file: PathBuf::from("crawl_state.json"),
            raw_scope_prefix: None,
            exclude_extensions: Vec::new(),
            link_selectors: vec!["a[href]".to_string()],
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            ignore_robots: false,
            normalization: NormalizationConfig::default(),
            fetch_mode: FetchMode::Http,
            anti_bot: AntiBotConfig::default(),
            pagination: PaginationConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            extract_content: false,
            metrics_file: None,
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.raw_url = Some(url.into());
        self
    }

    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn with_max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_max_depth(mut self, depth: i64) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_state_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_file = path.into();
        self
    }

    pub fn with_scope_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.raw_scope_prefix = Some(prefix.into());
        self
    }

    pub fn with_exclude_extensions(mut self, exts: Vec<String>) -> Self {
        self.exclude_extensions = exts;
        self
    }

    pub fn with_link_selectors(mut self, selectors: Vec<String>) -> Self {
        if !selectors.is_empty() {
            self.link_selectors = selectors;
        }
        self
    }

    pub fn with_min_content_length(mut self, n: usize) -> Self {
        self.min_content_length = n;
        self
    }

    pub fn with_ignore_robots(mut self, ignore: bool) -> Self {
        self.ignore_robots = ignore;
        self
    }

    pub fn with_lowercase_path(mut self, lowercase: bool) -> Self {
        self.normalization.lowercase_path = lowercase;
        self
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    pub fn with_anti_bot(mut self, anti_bot: AntiBotConfig) -> Self {
        self.anti_bot = anti_bot;
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn with_checkpoint_interval(mut self, n: u64) -> Self {
        self.checkpoint_interval = n.max(1);
        self
    }

    pub fn with_extract_content(mut self, extract: bool) -> Self {
        self.extract_content = extract;
        self
    }

    pub fn with_metrics_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.metrics_file = Some(path.into());
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let raw_url = self.raw_url.ok_or(ConfigError::MissingUrl)?;
        let url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl(raw_url.clone(), e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        if self.max_depth <= 0 {
            return Err(ConfigError::InvalidMaxDepth(self.max_depth));
        }
        if self.delay_ms < 0 {
            return Err(ConfigError::NegativeDelay(self.delay_ms));
        }

        let scope_prefix = match self.raw_scope_prefix {
            None => None,
            Some(ref s) if s == "none" => None,
            Some(s) => Some(Url::parse(&s).map_err(|e| ConfigError::InvalidScopePrefix(s, e))?),
        };

        if self.pagination.enabled && self.fetch_mode != FetchMode::Browser {
            return Err(ConfigError::PaginationRequiresBrowser);
        }
        if self.pagination.enabled && self.pagination.next_page_selector.is_none() {
            return Err(ConfigError::PaginationRequiresSelector);
        }

        Ok(Config {
            url,
            concurrent: self.concurrent,
            max_concurrent_requests: self.max_concurrent_requests.max(1),
            delay: Duration::from_millis(self.delay_ms as u64),
            max_depth: self.max_depth as u32,
            output_dir: self.output_dir,
            state_file: self.state_file,
            scope_prefix,
            exclude_extensions: self
                .exclude_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            link_selectors: self.link_selectors,
            min_content_length: self.min_content_length,
            ignore_robots: self.ignore_robots,
            normalization: self.normalization,
            fetch_mode: self.fetch_mode,
            anti_bot: self.anti_bot,
            pagination: self.pagination,
            user_agent: self.user_agent,
            checkpoint_interval: self.checkpoint_interval.max(1),
            extract_content: self.extract_content,
            metrics_file: self.metrics_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_is_rejected() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingUrl));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = ConfigBuilder::new()
            .with_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(_)));
    }

    #[test]
    fn negative_depth_is_rejected() {
        let err = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_max_depth(-1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxDepth(-1)));
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_max_depth(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxDepth(0)));
    }

    #[test]
    fn negative_delay_is_rejected() {
        let err = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_delay_ms(-5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NegativeDelay(-5)));
    }

    #[test]
    fn scope_prefix_none_token_disables_scoping() {
        let cfg = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_scope_prefix("none")
            .build()
            .unwrap();
        assert!(cfg.scope_prefix.is_none());
    }

    #[test]
    fn pagination_requires_browser_mode() {
        let err = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_pagination(PaginationConfig {
                enabled: true,
                next_page_selector: Some(".next".into()),
                max_pages: None,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::PaginationRequiresBrowser));
    }

    #[test]
    fn pagination_requires_selector() {
        let err = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_fetch_mode(FetchMode::Browser)
            .with_pagination(PaginationConfig {
                enabled: true,
                next_page_selector: None,
                max_pages: None,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::PaginationRequiresSelector));
    }

    #[test]
    fn valid_config_builds() {
        let cfg = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_max_depth(3)
            .build()
            .unwrap();
        assert_eq!(cfg.max_depth, 3);
        assert_eq!(cfg.checkpoint_interval, DEFAULT_CHECKPOINT_INTERVAL);
    }

    #[test]
    fn exclude_extensions_are_normalized() {
        let cfg = ConfigBuilder::new()
            .with_url("https://example.com")
            .with_exclude_extensions(vec![".JS".into(), "CSS".into()])
            .build()
            .unwrap();
        assert_eq!(cfg.exclude_extensions, vec!["js".to_string(), "css".to_string()]);
    }
}
