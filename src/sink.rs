//! Content sink: writes a fetched page as three sibling artifacts under a
//! deterministic, URL-derived stem.
//!
//! `infer` sniffs the body's MIME as a non-authoritative `detected_type`
//! metadata field rather than a control-flow gate, since acceptance is
//! already governed by the declared `Content-Type` header (see
//! [`crate::filter`]).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::error::SinkError;

const QUERY_REPLACE_WITH_UNDERSCORE: &[char] = &[':', '?', '*', '<', '>', '|', '"', '&'];
const INVALID_DIR_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/'];
const MAX_OUTPUT_DIR_NAME_LEN: usize = 100;
const DEFAULT_OUTPUT_DIR_NAME: &str = "scraped_content";

/// Metadata a content-readability extractor contributes to the page's
/// `.meta.json`.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub html: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub sitename: Option<String>,
}

/// The content-readability extraction interface the content sink consumes.
/// [`SimpleExtractor`] is a minimal concrete implementation so the crate
/// runs end to end; a production deployment would swap in a real
/// readability algorithm behind this trait.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, url: &Url, html: &str) -> Option<ExtractedContent>;
}

/// Pulls `<title>`, a handful of `<meta>` tags, and the `<body>` markup.
/// Not a readability algorithm — a placeholder that satisfies the trait
/// contract.
pub struct SimpleExtractor;

impl ContentExtractor for SimpleExtractor {
    fn extract(&self, _url: &Url, html: &str) -> Option<ExtractedContent> {
        let document = Html::parse_document(html);

        let title = select_text(&document, "title");
        let author = select_meta_content(&document, "author");
        let description = select_meta_content(&document, "description");
        let sitename = select_meta_content(&document, "og:site_name");
        let language = Selector::parse("html").ok().and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("lang"))
                .map(|s| s.to_string())
        });
        let body_html = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .map(|el| el.html())
            .unwrap_or_else(|| html.to_string());

        if body_html.trim().is_empty() {
            return None;
        }

        Some(ExtractedContent {
            html: body_html,
            title,
            author,
            date: None,
            language,
            description,
            sitename,
        })
    }
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_meta_content(document: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse(&format!(
        "meta[name='{name}'], meta[property='{name}']"
    ))
    .ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// The `.meta.json` shape. `content_file`/`content_size` and the extractor
/// fields are only present when applicable, via `skip_serializing_if`.
#[derive(Debug, Serialize)]
pub struct PageMetadata {
    pub url: String,
    pub timestamp: i64,
    pub size: u64,
    pub content_extracted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_type: Option<String>,
}

/// Paths of the artifacts written by one [`ContentSink::save`] call.
#[derive(Debug, Clone)]
pub struct SavedArtifacts {
    pub raw_path: PathBuf,
    pub content_path: Option<PathBuf>,
    pub meta_path: PathBuf,
}

pub struct ContentSink {
    output_dir: PathBuf,
    extract_content: bool,
    extractor: Box<dyn ContentExtractor>,
}

impl ContentSink {
    pub fn new(output_dir: impl Into<PathBuf>, extract_content: bool) -> Self {
        ContentSink::with_extractor(output_dir, extract_content, Box::new(SimpleExtractor))
    }

    pub fn with_extractor(
        output_dir: impl Into<PathBuf>,
        extract_content: bool,
        extractor: Box<dyn ContentExtractor>,
    ) -> Self {
        let output_dir = sanitize_output_dir(output_dir.into());
        ContentSink {
            output_dir,
            extract_content,
            extractor,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn ensure_output_dir(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| SinkError::CreateDir(self.output_dir.clone(), e))
    }

    /// Write the raw HTML, an optional extracted-content file, and the
    /// metadata JSON for `url`.
    pub async fn save(&self, url: &Url, body: &[u8]) -> Result<SavedArtifacts, SinkError> {
        let (dir_components, stem, raw_ext) = derive_name(url);

        let mut dir = self.output_dir.clone();
        for component in &dir_components {
            dir.push(component);
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SinkError::CreateDir(dir.clone(), e))?;

        let raw_path = dir.join(format!("{stem}.{raw_ext}"));
        tokio::fs::write(&raw_path, body)
            .await
            .map_err(|e| SinkError::Write(raw_path.clone(), e))?;

        let body_text = String::from_utf8_lossy(body);
        let detected_type = infer::get(body).map(|t| t.extension().to_string());

        let mut content_path = None;
        let mut content_size = None;
        let mut extracted = None;
        if self.extract_content {
            if let Some(ex) = self.extractor.extract(url, &body_text) {
                let path = dir.join(format!("{stem}.content.html"));
                tokio::fs::write(&path, ex.html.as_bytes())
                    .await
                    .map_err(|e| SinkError::Write(path.clone(), e))?;
                content_size = Some(ex.html.len() as u64);
                content_path = Some(path.clone());
                extracted = Some(ex);
            }
        }

        let meta = PageMetadata {
            url: url.to_string(),
            timestamp: Utc::now().timestamp(),
            size: body.len() as u64,
            content_extracted: content_path.is_some(),
            content_file: content_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string()),
            content_size,
            title: extracted.as_ref().and_then(|e| e.title.clone()),
            author: extracted.as_ref().and_then(|e| e.author.clone()),
            date: extracted.as_ref().and_then(|e| e.date),
            language: extracted.as_ref().and_then(|e| e.language.clone()),
            description: extracted.as_ref().and_then(|e| e.description.clone()),
            sitename: extracted.as_ref().and_then(|e| e.sitename.clone()),
            detected_type,
        };
        let meta_path = dir.join(format!("{stem}.meta.json"));
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(SinkError::Serialize)?;
        tokio::fs::write(&meta_path, meta_json)
            .await
            .map_err(|e| SinkError::Write(meta_path.clone(), e))?;

        Ok(SavedArtifacts {
            raw_path,
            content_path,
            meta_path,
        })
    }
}

/// Derive a page's on-disk name from its URL. Returns (subdirectory
/// components, shared stem, raw-artifact extension). The stem is what
/// `.content.html` and `.meta.json` are suffixed onto; the raw artifact
/// gets `<stem>.<raw_ext>`, where `raw_ext` preserves the URL's own
/// extension when present and falls back to `html` otherwise.
fn derive_name(url: &Url) -> (Vec<String>, String, String) {
    let trimmed_path = url.path().trim_matches('/');
    let mut components: Vec<String> = if trimmed_path.is_empty() {
        vec!["index".to_string()]
    } else {
        trimmed_path.split('/').map(|s| s.to_string()).collect()
    };
    let base = components.pop().unwrap_or_else(|| "index".to_string());

    let (name_no_ext, raw_ext) = match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => (base[..idx].to_string(), base[idx + 1..].to_string()),
        _ => (base, "html".to_string()),
    };

    let stem = match url.query() {
        Some(q) if !q.is_empty() => format!("{name_no_ext}_{}", sanitize_query(q)),
        _ => name_no_ext,
    };

    (components, stem, raw_ext)
}

fn sanitize_query(raw_query: &str) -> String {
    raw_query
        .chars()
        .map(|c| {
            if QUERY_REPLACE_WITH_UNDERSCORE.contains(&c) {
                '_'
            } else if c == '=' {
                '-'
            } else {
                c
            }
        })
        .collect()
}

/// Replace only the output directory's final path component with a
/// filesystem-safe name; any parent directories the caller supplied are
/// left as-is.
fn sanitize_output_dir(path: PathBuf) -> PathBuf {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return PathBuf::from(DEFAULT_OUTPUT_DIR_NAME);
    };

    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if INVALID_DIR_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    sanitized = sanitized.trim_matches(|c: char| c == '.' || c == ' ').to_string();
    if sanitized.is_empty() {
        sanitized = DEFAULT_OUTPUT_DIR_NAME.to_string();
    }
    let truncate_at = (0..=MAX_OUTPUT_DIR_NAME_LEN.min(sanitized.len()))
        .rev()
        .find(|&idx| sanitized.is_char_boundary(idx))
        .unwrap_or(0);
    sanitized.truncate(truncate_at);

    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from(sanitized),
        Some(parent) => parent.join(sanitized),
        None => PathBuf::from(sanitized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_name_empty_path_uses_index() {
        let url = Url::parse("https://example.com/").unwrap();
        let (dirs, stem, ext) = derive_name(&url);
        assert!(dirs.is_empty());
        assert_eq!(stem, "index");
        assert_eq!(ext, "html");
    }

    #[test]
    fn derive_name_preserves_subdirectories() {
        let url = Url::parse("https://example.com/a/b/page").unwrap();
        let (dirs, stem, ext) = derive_name(&url);
        assert_eq!(dirs, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(stem, "page");
        assert_eq!(ext, "html");
    }

    #[test]
    fn derive_name_appends_html_when_no_dot() {
        let url = Url::parse("https://example.com/page").unwrap();
        let (_, stem, ext) = derive_name(&url);
        assert_eq!(stem, "page");
        assert_eq!(ext, "html");
    }

    #[test]
    fn derive_name_preserves_existing_extension() {
        let url = Url::parse("https://example.com/report.pdf").unwrap();
        let (_, stem, ext) = derive_name(&url);
        assert_eq!(stem, "report");
        assert_eq!(ext, "pdf");
    }

    #[test]
    fn derive_name_inserts_sanitized_query_before_extension() {
        let url = Url::parse("https://example.com/report.pdf?a=1&b=2").unwrap();
        let (_, stem, ext) = derive_name(&url);
        assert_eq!(stem, "report_a-1_b-2");
        assert_eq!(ext, "pdf");
    }

    #[test]
    fn derive_name_with_query_and_no_dot() {
        let url = Url::parse("https://example.com/search?q=rust&page=2").unwrap();
        let (_, stem, ext) = derive_name(&url);
        assert_eq!(stem, "search_q-rust_page-2");
        assert_eq!(ext, "html");
    }

    #[test]
    fn sanitize_query_replaces_reserved_chars() {
        assert_eq!(sanitize_query("a:b?c*d<e>f|g\"h&i=j"), "a_b_c_d_e_f_g_h_i-j");
    }

    #[test]
    fn sanitize_output_dir_replaces_invalid_chars_and_clamps_length() {
        let dirty = "bad<name>|?*".repeat(20);
        let sanitized = sanitize_output_dir(PathBuf::from(dirty));
        assert!(!sanitized.to_string_lossy().contains('<'));
        assert!(sanitized.to_string_lossy().len() <= MAX_OUTPUT_DIR_NAME_LEN);
    }

    #[test]
    fn sanitize_output_dir_empty_becomes_default() {
        let sanitized = sanitize_output_dir(PathBuf::from("..."));
        assert_eq!(sanitized, PathBuf::from(DEFAULT_OUTPUT_DIR_NAME));
    }

    #[tokio::test]
    async fn save_writes_raw_and_meta_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ContentSink::new(dir.path(), false);
        sink.ensure_output_dir().await.unwrap();
        let url = Url::parse("https://example.com/a/page?x=1").unwrap();
        let body = b"<html><body>hello</body></html>";

        let first = sink.save(&url, body).await.unwrap();
        let raw1 = tokio::fs::read(&first.raw_path).await.unwrap();
        sink.save(&url, body).await.unwrap();
        let raw2 = tokio::fs::read(&first.raw_path).await.unwrap();
        assert_eq!(raw1, raw2, "saving the same URL twice must be deterministic");

        assert!(first.raw_path.to_string_lossy().ends_with("page_x-1.html"));
        assert!(tokio::fs::try_exists(&first.meta_path).await.unwrap());
    }

    #[tokio::test]
    async fn save_writes_content_file_when_extraction_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ContentSink::new(dir.path(), true);
        sink.ensure_output_dir().await.unwrap();
        let url = Url::parse("https://example.com/article").unwrap();
        let body = b"<html><head><title>T</title></head><body><p>content here</p></body></html>";

        let artifacts = sink.save(&url, body).await.unwrap();
        assert!(artifacts.content_path.is_some());
        let meta_bytes = tokio::fs::read(&artifacts.meta_path).await.unwrap();
        let meta: serde_json::Value = serde_json::from_slice(&meta_bytes).unwrap();
        assert_eq!(meta["content_extracted"], true);
        assert_eq!(meta["title"], "T");
    }
}
