//! Browser/pagination coupling.
//!
//! The pagination routine itself (content-hash-driven exhaustion, actual
//! "click next" automation) lives behind the browser fetcher. What belongs
//! here is the seam the scheduler calls through: naming each page's virtual
//! URL and handing pages to a per-page callback at the original URL's depth.

use async_trait::async_trait;
use url::Url;

use crate::config::PaginationConfig;
use crate::error::FetchError;

/// One fetched page within a paginated sequence.
#[derive(Debug, Clone)]
pub struct PaginatedPage {
    pub virtual_url: Url,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Callback the scheduler supplies to consume each page as it arrives: saves
/// it through the content sink and extracts/enqueues its links.
#[async_trait]
pub trait PageSink: Send {
    async fn on_page(&mut self, page: PaginatedPage);
}

/// Builds the virtual URL for page `n` of `original`, as
/// `<original>?_page=<n>`. `n` is 1-based; the first page of a paginated
/// sequence is conventionally fetched directly and not passed through this
/// helper, but it is still valid to name page 1 with it.
pub fn virtual_page_url(original: &Url, n: u32) -> Url {
    let mut url = original.clone();
    let mut query = url
        .query()
        .map(|q| format!("{q}&"))
        .unwrap_or_default();
    query.push_str(&format!("_page={n}"));
    url.set_query(Some(&query));
    url
}

/// The coupling point itself: this default implementation has no browser
/// to drive and always reports immediate exhaustion, matching
/// [`crate::fetcher::BrowserFetcher`]'s stub status.
pub async fn run_pagination(
    _original: &Url,
    _config: &PaginationConfig,
    _sink: &mut dyn PageSink,
) -> Result<u32, FetchError> {
    Err(FetchError::BrowserFetcherUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_page_url_appends_page_param() {
        let original = Url::parse("https://example.com/gallery").unwrap();
        let page = virtual_page_url(&original, 2);
        assert_eq!(page.as_str(), "https://example.com/gallery?_page=2");
    }

    #[test]
    fn virtual_page_url_preserves_existing_query() {
        let original = Url::parse("https://example.com/gallery?sort=new").unwrap();
        let page = virtual_page_url(&original, 3);
        assert_eq!(page.query(), Some("sort=new&_page=3"));
    }

    #[tokio::test]
    async fn run_pagination_reports_unavailable_without_a_browser() {
        struct NoopSink;
        #[async_trait]
        impl PageSink for NoopSink {
            async fn on_page(&mut self, _page: PaginatedPage) {}
        }
        let original = Url::parse("https://example.com/gallery").unwrap();
        let mut sink = NoopSink;
        let err = run_pagination(&original, &PaginationConfig::default(), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BrowserFetcherUnavailable));
    }
}
