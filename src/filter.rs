//! Link filter: scheme, extension, scope-prefix, and Content-Type
//! acceptance rules.
//!
//! The scope/host-prefix check is a configurable generalization of a plain
//! same-host rule: any scope URL's host+path prefix, not just its host.

use std::str::FromStr;

use mime::Mime;
use url::Url;

/// Decides whether a discovered link is in scope, and whether a fetched
/// response's `Content-Type` should be kept.
pub struct LinkFilter {
    scope_prefix: Option<Url>,
    exclude_extensions: Vec<String>,
}

/// Outcome of a Content-Type check, distinguished from a generic fetch
/// error with its own `content_filtered` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTypeDecision {
    Accept,
    Filtered,
}

impl LinkFilter {
    pub fn new(scope_prefix: Option<Url>, exclude_extensions: Vec<String>) -> Self {
        LinkFilter {
            scope_prefix,
            exclude_extensions: exclude_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Accept/reject a raw absolute URL.
    pub fn accept(&self, raw_url: &str) -> bool {
        let url = match Url::parse(raw_url) {
            Ok(u) => u,
            Err(_) => return false,
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        if !self.exclude_extensions.is_empty() {
            if let Some(ext) = path_extension(url.path()) {
                if self.exclude_extensions.contains(&ext) {
                    return false;
                }
            }
        }

        if let Some(scope) = &self.scope_prefix {
            if !in_scope(scope, &url) {
                return false;
            }
        }

        true
    }

    /// Map a response `Content-Type` header to a canonical extension and
    /// check it against the exclusion list. Returns `Accept` when
    /// `exclude_extensions` is empty, disabling both extension and
    /// content-type filtering entirely.
    pub fn check_content_type(&self, content_type: &str) -> ContentTypeDecision {
        if self.exclude_extensions.is_empty() {
            return ContentTypeDecision::Accept;
        }

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim();

        if let Some(ext) = mapped_extension(essence) {
            return if self.exclude_extensions.contains(&ext.to_string()) {
                ContentTypeDecision::Filtered
            } else {
                ContentTypeDecision::Accept
            };
        }

        // Unmapped type: conservative substring fallback against the
        // exclusion list.
        let lower = essence.to_ascii_lowercase();
        if self.exclude_extensions.iter().any(|ext| lower.contains(ext.as_str())) {
            ContentTypeDecision::Filtered
        } else {
            ContentTypeDecision::Accept
        }
    }
}

fn path_extension(path: &str) -> Option<String> {
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    let dot = last_segment.rfind('.')?;
    if dot + 1 >= last_segment.len() {
        return None;
    }
    Some(last_segment[dot + 1..].to_ascii_lowercase())
}

/// In scope unless the host differs from the scope's host, or the
/// candidate's path doesn't begin with the scope's path (both stripped of
/// a single trailing slash before the prefix check).
fn in_scope(scope: &Url, candidate: &Url) -> bool {
    if scope.host_str() != candidate.host_str() {
        return false;
    }
    let scope_path = strip_one_trailing_slash(scope.path());
    let candidate_path = strip_one_trailing_slash(candidate.path());
    candidate_path.starts_with(scope_path)
}

fn strip_one_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// A closed table mapping well-known Content-Type essence strings to their
/// canonical file extension.
fn mapped_extension(essence: &str) -> Option<&'static str> {
    let parsed: Mime = Mime::from_str(essence).ok()?;
    match (parsed.type_().as_str(), parsed.subtype().as_str()) {
        ("application", "pdf") => Some("pdf"),
        ("application", "zip") => Some("zip"),
        ("application", "json") => Some("json"),
        ("application", "javascript") | ("text", "javascript") => Some("js"),
        ("application", "xml") | ("text", "xml") => Some("xml"),
        ("application", "msword") => Some("doc"),
        ("application", "vnd.ms-excel") => Some("xls"),
        ("application", "octet-stream") => Some("bin"),
        ("image", "jpeg") => Some("jpg"),
        ("image", "png") => Some("png"),
        ("image", "gif") => Some("gif"),
        ("image", "svg+xml") => Some("svg"),
        ("image", "webp") => Some("webp"),
        ("audio", "mpeg") => Some("mp3"),
        ("video", "mp4") => Some("mp4"),
        ("text", "css") => Some("css"),
        ("text", "csv") => Some("csv"),
        ("text", "html") => Some("html"),
        ("text", "plain") => Some("txt"),
        _ => None,
    }
}
