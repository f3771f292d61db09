//! Meaningful-content check and link extraction.
//!
//! Configurable CSS selectors find outgoing links; a script/style-aware
//! text-length gate decides whether a fetched page is worth keeping.

use scraper::{Html, Selector};
use url::Url;

/// Parse `html`, strip `<script>`/`<style>` subtrees, and return whether the
/// remaining trimmed text exceeds `min_content_length` (falling back to
/// 100 when the config leaves it at 0).
pub fn has_meaningful_content(html: &str, min_content_length: usize) -> bool {
    let threshold = if min_content_length == 0 { 100 } else { min_content_length };
    let document = Html::parse_document(html);

    // `scraper`'s tree has no subtree-removal API, so instead of deleting
    // script/style nodes we select everything *except* their descendants by
    // walking text nodes and skipping ones whose ancestor chain contains a
    // script/style element.
    let skip = match Selector::parse("script, style") {
        Ok(s) => s,
        Err(_) => return document.root_element().text().collect::<String>().trim().len() > threshold,
    };
    let skipped_ids: std::collections::HashSet<_> = document
        .select(&skip)
        .flat_map(|el| el.descendants().map(|d| d.id()))
        .collect();

    let text: String = document
        .root_element()
        .descendants()
        .filter_map(|node| node.value().as_text().map(|t| (node.id(), t)))
        .filter(|(id, _)| !skipped_ids.contains(id))
        .map(|(_, t)| -> &str { &t })
        .collect();

    text.trim().len() > threshold
}

/// Extract absolute, resolved links from `html` using the configured CSS
/// selectors, against `page_url` as the base for relative resolution.
/// Malformed selectors or `href`s are silently skipped; a panic inside a
/// single selector's matching is caught so one bad selector never poisons
/// the others.
pub fn extract_links(page_url: &Url, html: &str, selectors: &[String]) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for selector_str in selectors {
        let selector = match Selector::parse(selector_str) {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!(selector = %selector_str, "skipping unparseable link selector");
                continue;
            }
        };

        let matched = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("href"))
                .filter_map(|href| resolve_href(page_url, href))
                .collect::<Vec<_>>()
        }));

        match matched {
            Ok(mut found) => links.append(&mut found),
            Err(_) => {
                tracing::error!(selector = %selector_str, "link extraction panicked for selector, skipping");
            }
        }
    }

    links
}

/// Resolve a possibly-relative `href` against `base`, skipping non-web
/// schemes and anything that fails to parse.
fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
        || trimmed.starts_with("javascript:")
    {
        return None;
    }
    base.join(trimmed).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meaningful_content_ignores_script_and_style() {
        let html = format!(
            "<html><body><p>{}</p><script>{}</script><style>{}</style></body></html>",
            "word ".repeat(30),
            "var x = 'a'.repeat(500);",
            ".x { color: red; }".repeat(20)
        );
        assert!(has_meaningful_content(&html, 50));
    }

    #[test]
    fn meaningful_content_rejects_short_pages() {
        let html = "<html><body><p>hi</p></body></html>";
        assert!(!has_meaningful_content(html, 100));
    }

    #[test]
    fn meaningful_content_all_script_is_rejected() {
        let html = format!(
            "<html><body><script>{}</script></body></html>",
            "x".repeat(500)
        );
        assert!(!has_meaningful_content(&html, 100));
    }

    #[test]
    fn meaningful_content_zero_threshold_falls_back_to_100() {
        let html = format!("<html><body><p>{}</p></body></html>", "a".repeat(50));
        assert!(!has_meaningful_content(&html, 0));
    }

    #[test]
    fn extract_links_resolves_relative_and_skips_junk() {
        let base = Url::parse("https://example.com/dir/page.html").unwrap();
        let html = r##"
            <html><body>
                <a href="/absolute">a</a>
                <a href="relative.html">b</a>
                <a href="https://other.com/x">c</a>
                <a href="#section">skip-anchor</a>
                <a href="mailto:test@example.com">skip-mail</a>
                <a>no-href</a>
            </body></html>
        "##;
        let links = extract_links(&base, html, &["a[href]".to_string()]);
        assert_eq!(
            links,
            vec![
                "https://example.com/absolute".to_string(),
                "https://example.com/dir/relative.html".to_string(),
                "https://other.com/x".to_string(),
            ]
        );
    }

    #[test]
    fn extract_links_with_custom_selector() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = r#"<nav><a href="/nav-link">n</a></nav><div><a href="/div-link">d</a></div>"#;
        let links = extract_links(&base, html, &["nav a[href]".to_string()]);
        assert_eq!(links, vec!["https://example.com/nav-link".to_string()]);
    }

    #[test]
    fn extract_links_unparseable_selector_is_skipped_not_fatal() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = r#"<a href="/ok">ok</a>"#;
        let links = extract_links(&base, html, &["[[[".to_string(), "a[href]".to_string()]);
        assert_eq!(links, vec!["https://example.com/ok".to_string()]);
    }
}
