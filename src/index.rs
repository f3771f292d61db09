//! Post-crawl HTML index generation: a final `_index.html` listing every
//! saved page. The scheduler calls a trait at the end of a run, with a
//! concrete default implementation provided so the crate is runnable end
//! to end.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SinkError;

/// The minimal fields an index needs out of a page's `.meta.json`. Unknown
/// fields are ignored by `serde`'s default behavior.
#[derive(Debug, Deserialize)]
struct IndexedMeta {
    url: String,
    timestamp: i64,
    #[serde(default)]
    title: Option<String>,
}

/// The index-building seam the scheduler calls after its main loop exits.
#[async_trait]
pub trait IndexGenerator: Send + Sync {
    async fn build(&self, output_dir: &Path) -> Result<(), SinkError>;
}

/// Walks every `*.meta.json` under `output_dir`, sorts by crawl timestamp,
/// and renders a static `_index.html` linking each page's raw HTML
/// artifact.
pub struct HtmlIndexGenerator;

#[async_trait]
impl IndexGenerator for HtmlIndexGenerator {
    async fn build(&self, output_dir: &Path) -> Result<(), SinkError> {
        let mut entries = collect_meta_files(output_dir).await?;
        entries.sort_by_key(|(meta, _)| meta.timestamp);

        let body: String = entries
            .iter()
            .map(|(meta, raw_path)| {
                let href = raw_path
                    .strip_prefix(output_dir)
                    .unwrap_or(raw_path)
                    .to_string_lossy()
                    .replace('\\', "/");
                let label = meta.title.clone().unwrap_or_else(|| meta.url.clone());
                format!(
                    "<li><a href=\"{href}\">{}</a> <small>{}</small></li>\n",
                    html_escape(&label),
                    html_escape(&meta.url)
                )
            })
            .collect();

        let html = format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Crawl Index</title></head>\n<body>\n<h1>Crawl Index</h1>\n<ul>\n{body}</ul>\n</body></html>\n"
        );

        let index_path = output_dir.join("_index.html");
        tokio::fs::write(&index_path, html)
            .await
            .map_err(|e| SinkError::Write(index_path, e))
    }
}

async fn collect_meta_files(dir: &Path) -> Result<Vec<(IndexedMeta, PathBuf)>, SinkError> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut read_dir = match tokio::fs::read_dir(&current).await {
            Ok(rd) => rd,
            Err(_) => continue,
        };
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| SinkError::Write(current.clone(), e))?
        {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(_) => continue,
            };
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if !path.to_string_lossy().ends_with(".meta.json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            let Ok(meta) = serde_json::from_slice::<IndexedMeta>(&bytes) else {
                continue;
            };
            let raw_path = raw_artifact_path(&path);
            out.push((meta, raw_path));
        }
    }

    Ok(out)
}

/// `<stem>.meta.json` -> `<stem>.html`. The raw artifact's own extension
/// isn't recoverable from the metadata file's name alone (it may not be
/// `.html`, see [`crate::sink`]); this minimal generator just points at the
/// conventional name.
fn raw_artifact_path(meta_path: &Path) -> PathBuf {
    let file_name = meta_path.file_name().unwrap_or_default().to_string_lossy();
    let stem = file_name.strip_suffix(".meta.json").unwrap_or(&file_name);
    meta_path.with_file_name(format!("{stem}.html"))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
