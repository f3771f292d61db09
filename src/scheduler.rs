//! Scheduler: the conductor.
//!
//! A durable, pausable, checkpointing queue-drain loop, run either
//! sequentially or as bounded-concurrent worker tasks. Panic isolation per
//! URL is done with `tokio::spawn` (a panicking task resolves its
//! `JoinHandle` to `Err`, rather than unwinding the caller), the idiomatic
//! way to bound a panic to a single unit of async work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};
use url::Url;

use crate::canonical::canonicalize_with;
use crate::config::{Config, FetchMode};
use crate::content::{extract_links, has_meaningful_content};
use crate::error::CrawlError;
use crate::events::{CrawlerEvent, EventEmitter, EventType, NullEmitter};
use crate::fetcher::{BrowserFetcher, Fetcher, HttpFetcher};
use crate::filter::{ContentTypeDecision, LinkFilter};
use crate::index::{HtmlIndexGenerator, IndexGenerator};
use crate::metrics::Metrics;
use crate::pagination::{run_pagination, PageSink, PaginatedPage};
use crate::robots::RobotsCache;
use crate::sink::ContentSink;
use crate::state::StateStore;

struct Inner {
    config: Config,
    state: StateStore,
    robots: RobotsCache,
    filter: LinkFilter,
    metrics: Metrics,
    events: Box<dyn EventEmitter>,
    fetcher: Box<dyn Fetcher>,
    sink: ContentSink,
    index_generator: Box<dyn IndexGenerator>,
    semaphore: Arc<Semaphore>,
    canonical_seed: String,
    paused: AtomicBool,
    cancelled: AtomicBool,
    resume_notify: Notify,
}

/// Owns every crawl collaborator and drives them through the crawl
/// lifecycle. Cheaply `Clone`: every clone shares the same underlying
/// state, which is how the CLI hands a handle to a ctrl-c listener while
/// `start()` runs on the main task.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Build a scheduler with the default (no-op) event emitter and
    /// HTML index generator, selecting the fetcher implementation from
    /// `config.fetch_mode`.
    pub async fn new(config: Config) -> Result<Self, CrawlError> {
        Scheduler::new_with(config, Box::new(NullEmitter), None, Box::new(HtmlIndexGenerator)).await
    }

    /// Full constructor: lets callers supply an event emitter, override the
    /// fetcher (primarily for tests — a mock implementing [`Fetcher`]), and
    /// swap the index generator.
    pub async fn new_with(
        config: Config,
        events: Box<dyn EventEmitter>,
        fetcher_override: Option<Box<dyn Fetcher>>,
        index_generator: Box<dyn IndexGenerator>,
    ) -> Result<Self, CrawlError> {
        let canonical_seed = canonicalize_with(config.url.as_str(), config.normalization.lowercase_path);
        let state = StateStore::load(&config.state_file, &canonical_seed).await?;
        let robots = RobotsCache::new(&config.user_agent, config.ignore_robots);
        let filter = LinkFilter::new(config.scope_prefix.clone(), config.exclude_extensions.clone());
        let metrics = Metrics::new();
        let sink = ContentSink::new(config.output_dir.clone(), config.extract_content);
        let fetcher = fetcher_override.unwrap_or_else(|| match config.fetch_mode {
            FetchMode::Http => Box::new(HttpFetcher::new()) as Box<dyn Fetcher>,
            FetchMode::Browser => {
                Box::new(BrowserFetcher::new(config.anti_bot.clone(), config.pagination.clone()))
                    as Box<dyn Fetcher>
            }
        });
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests));

        Ok(Scheduler {
            inner: Arc::new(Inner {
                config,
                state,
                robots,
                filter,
                metrics,
                events,
                fetcher,
                sink,
                index_generator,
                semaphore,
                canonical_seed,
                paused: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                resume_notify: Notify::new(),
            }),
        })
    }

    /// Sets a flag; gates only the control thread's dispatch of new work,
    /// in-flight fetches are unaffected.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        self.inner
            .events
            .emit(CrawlerEvent::new(EventType::CrawlPaused, json!({})));
    }

    pub fn resume(&self) {
        wake_paused_waiter(&self.inner);
        self.inner
            .events
            .emit(CrawlerEvent::new(EventType::CrawlResumed, json!({})));
    }

    /// Cancels the scheduler *and* wakes any paused waiter, so a paused
    /// run observes the cancellation instead of hanging.
    pub fn stop(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        wake_paused_waiter(&self.inner);
        self.inner
            .events
            .emit(CrawlerEvent::new(EventType::CrawlStopped, json!({})));
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Releases fetcher-held resources. Called once, after `start` returns.
    pub async fn close(&self) {
        self.inner.fetcher.close().await;
    }

    pub async fn state_snapshot(&self) -> crate::state::StateSnapshot {
        self.inner.state.snapshot().await
    }

    /// The full crawl lifecycle, from loading state through writing the
    /// final snapshot.
    pub async fn start(&self) -> Result<(), CrawlError> {
        self.inner.state.seed_if_empty(&self.inner.canonical_seed).await;

        self.inner
            .sink
            .ensure_output_dir()
            .await
            .map_err(|e| match e {
                crate::error::SinkError::CreateDir(path, io_err) => CrawlError::OutputDir(path, io_err),
                other => CrawlError::OutputDir(
                    self.inner.sink.output_dir().to_path_buf(),
                    std::io::Error::other(other.to_string()),
                ),
            })?;

        if self.inner.config.anti_bot.wait_for_interactive_login
            && self.inner.config.fetch_mode == FetchMode::Browser
        {
            self.inner
                .events
                .emit(CrawlerEvent::new(EventType::WaitingForLogin, json!({})));
            if let Err(e) = self.inner.fetcher.wait_for_login().await {
                tracing::warn!(error = %e, "interactive login did not complete; continuing without it");
            }
        }

        self.inner.events.emit(CrawlerEvent::new(
            EventType::CrawlStarted,
            json!({"url": self.inner.config.url.as_str()}),
        ));

        if self.inner.config.concurrent {
            run_concurrent(Arc::clone(&self.inner)).await;
        } else {
            run_sequential(Arc::clone(&self.inner)).await;
        }

        let queue_size = self.inner.state.queue_len().await as u64;
        let snapshot = self.inner.metrics.snapshot(queue_size);
        if let Some(path) = &self.inner.config.metrics_file {
            if let Err(e) = write_metrics_file(path, &snapshot).await {
                tracing::warn!(error = %e, "failed to write metrics file");
            }
        }

        self.inner.events.emit(CrawlerEvent::new(
            EventType::CrawlCompleted,
            json!({"urls_processed": snapshot.urls_processed}),
        ));

        let output_dir = self.inner.sink.output_dir().to_path_buf();
        if let Err(e) = self.inner.index_generator.build(&output_dir).await {
            tracing::warn!(error = %e, "failed to build html index");
        }

        if let Err(e) = self.inner.state.save().await {
            tracing::warn!(error = %e, "failed to write final state snapshot");
        }

        Ok(())
    }
}

fn wake_paused_waiter(inner: &Arc<Inner>) {
    inner.paused.store(false, Ordering::SeqCst);
    inner.resume_notify.notify_one();
}

async fn wait_while_paused(inner: &Arc<Inner>) {
    loop {
        if !inner.paused.load(Ordering::SeqCst) || inner.cancelled.load(Ordering::SeqCst) {
            return;
        }
        inner.resume_notify.notified().await;
    }
}

async fn write_metrics_file(
    path: &std::path::Path,
    snapshot: &crate::metrics::MetricsSnapshot,
) -> std::io::Result<()> {
    let json = snapshot
        .to_json_pretty()
        .map_err(std::io::Error::other)?;
    tokio::fs::write(path, json).await
}

/// Drains the queue one URL at a time, checkpointing periodically.
async fn run_sequential(inner: Arc<Inner>) {
    while !inner.state.queue_is_empty().await {
        wait_while_paused(&inner).await;
        if inner.cancelled.load(Ordering::SeqCst) {
            return;
        }

        let Some(item) = inner.state.pop().await else {
            break;
        };

        if inner.state.is_visited(&item.url).await {
            inner.metrics.record_skipped();
            continue;
        }
        if item.depth > inner.config.max_depth {
            inner.metrics.record_depth_limit_hit();
            continue;
        }

        process_url_guarded(Arc::clone(&inner), item.url, item.depth).await;
        tokio::time::sleep(inner.config.delay).await;

        if inner.state.processed().await % inner.config.checkpoint_interval == 0 {
            checkpoint(&inner).await;
        }
    }
}

/// Drains the queue into a bounded pool of spawned worker tasks. Live-worker
/// count is read off the semaphore (the number of permits currently checked
/// out) rather than a separate counter, since the semaphore already tracks
/// exactly that.
async fn run_concurrent(inner: Arc<Inner>) {
    loop {
        wait_while_paused(&inner).await;
        if inner.cancelled.load(Ordering::SeqCst) {
            break;
        }

        if !inner.state.queue_is_empty().await {
            let Some(item) = inner.state.pop().await else {
                continue;
            };
            if inner.state.is_visited(&item.url).await {
                inner.metrics.record_skipped();
                continue;
            }
            if item.depth > inner.config.max_depth {
                inner.metrics.record_depth_limit_hit();
                continue;
            }

            let permit = Arc::clone(&inner.semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed during a run");
            let worker_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                process_url_guarded(Arc::clone(&worker_inner), item.url, item.depth).await;
                tokio::time::sleep(worker_inner.config.delay).await;
                drop(permit);
            });

            if inner.state.processed().await % inner.config.checkpoint_interval == 0 {
                checkpoint_quiesced(&inner).await;
            }
        } else if inner.semaphore.available_permits() < inner.config.max_concurrent_requests {
            tokio::time::sleep(inner.config.queue_empty_poll_interval()).await;
        } else {
            break;
        }
    }
}

/// Waits for every outstanding worker to release its permit before
/// checkpointing, so the on-disk snapshot is a consistent cut.
async fn checkpoint_quiesced(inner: &Arc<Inner>) {
    let total = inner.config.max_concurrent_requests as u32;
    let permits = Arc::clone(&inner.semaphore)
        .acquire_many_owned(total)
        .await
        .expect("semaphore is never closed during a run");
    checkpoint(inner).await;
    drop(permits);
}

/// Saves the frontier and emits a single `progress` event carrying a
/// metrics snapshot. Called at most once per `checkpoint_interval`, so this
/// is also the progress-emission throttle.
async fn checkpoint(inner: &Arc<Inner>) {
    if let Err(e) = inner.state.save().await {
        tracing::warn!(error = %e, "checkpoint save failed");
    }

    let queue_size = inner.state.queue_len().await as u64;
    let snapshot = inner.metrics.snapshot(queue_size);
    let payload = serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({}));
    inner.events.emit(CrawlerEvent::new(EventType::Progress, payload));
}

/// Runs [`process_url`] inside a `tokio::spawn`ed task so a panic anywhere
/// in the per-URL pipeline (malformed HTML, a panicking selector) is
/// converted into a counted error instead of tearing down the scheduler.
async fn process_url_guarded(inner: Arc<Inner>, url: String, depth: u32) {
    let handle = tokio::spawn(process_url(Arc::clone(&inner), url, depth));
    if let Err(join_err) = handle.await {
        tracing::warn!(error = %join_err, "panic while processing url");
        inner.metrics.record_errored();
    }
}

/// Fetches one URL, decides whether to keep it, saves it, and enqueues its
/// accepted outgoing links.
async fn process_url(inner: Arc<Inner>, url: String, depth: u32) {
    if !inner.state.mark_visited(&url).await {
        return;
    }
    inner.metrics.record_processed();

    let parsed = match Url::parse(&url) {
        Ok(u) => u,
        Err(_) => {
            inner.metrics.record_errored();
            return;
        }
    };

    if !inner.robots.is_allowed(&parsed).await {
        inner.metrics.record_robots_blocked();
        return;
    }

    if inner.config.fetch_mode == FetchMode::Browser && inner.config.pagination.enabled {
        process_paginated(&inner, &parsed, depth).await;
        return;
    }

    let response = match inner.fetcher.fetch(&parsed, &inner.config.user_agent).await {
        Ok(r) => r,
        Err(_) => {
            inner.metrics.record_errored();
            return;
        }
    };

    if response.status != 200 {
        inner.metrics.record_errored();
        return;
    }

    if let Some(content_type) = &response.content_type {
        if inner.filter.check_content_type(content_type) == ContentTypeDecision::Filtered {
            inner.metrics.record_content_filtered();
            return;
        }
    }

    let body_text = String::from_utf8_lossy(&response.body).into_owned();
    if !has_meaningful_content(&body_text, inner.config.min_content_length) {
        inner.metrics.record_content_filtered();
        return;
    }

    match inner.sink.save(&parsed, &response.body).await {
        Ok(_) => {
            inner.metrics.record_saved(response.body.len() as u64);
            inner.events.emit(CrawlerEvent::new(
                EventType::UrlProcessed,
                json!({"url": url}),
            ));
        }
        Err(e) => {
            tracing::warn!(error = %e, url, "failed to write page artifacts");
            inner.metrics.record_errored();
            return;
        }
    }

    for link in extract_links(&parsed, &body_text, &inner.config.link_selectors) {
        if inner.filter.accept(&link) {
            let canonical = canonicalize_with(&link, inner.config.normalization.lowercase_path);
            inner.state.try_enqueue(&canonical, depth + 1).await;
        }
    }
}

/// Runs a paginated sequence starting at `original` and drives each
/// returned page through the same save/filter/extract pipeline as a single
/// page, except that every page of the sequence is enqueued-from at
/// `depth`, not `depth + 1` — they are all facets of one logical document.
async fn process_paginated(inner: &Arc<Inner>, original: &Url, depth: u32) {
    let mut sink = SchedulerPageSink {
        inner: Arc::clone(inner),
        depth,
    };
    match run_pagination(original, &inner.config.pagination, &mut sink).await {
        Ok(pages) => tracing::debug!(url = %original, pages, "paginated sequence exhausted"),
        Err(e) => {
            tracing::warn!(error = %e, url = %original, "paginated fetch failed");
            inner.metrics.record_errored();
        }
    }
}

struct SchedulerPageSink {
    inner: Arc<Inner>,
    depth: u32,
}

#[async_trait]
impl PageSink for SchedulerPageSink {
    async fn on_page(&mut self, page: PaginatedPage) {
        let inner = &self.inner;

        if let Some(content_type) = &page.content_type {
            if inner.filter.check_content_type(content_type) == ContentTypeDecision::Filtered {
                inner.metrics.record_content_filtered();
                return;
            }
        }

        let body_text = String::from_utf8_lossy(&page.body).into_owned();
        if !has_meaningful_content(&body_text, inner.config.min_content_length) {
            inner.metrics.record_content_filtered();
            return;
        }

        match inner.sink.save(&page.virtual_url, &page.body).await {
            Ok(_) => {
                inner.metrics.record_saved(page.body.len() as u64);
                inner.events.emit(CrawlerEvent::new(
                    EventType::UrlProcessed,
                    json!({"url": page.virtual_url.as_str()}),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %page.virtual_url, "failed to write paginated page artifacts");
                inner.metrics.record_errored();
                return;
            }
        }

        for link in extract_links(&page.virtual_url, &body_text, &inner.config.link_selectors) {
            if inner.filter.accept(&link) {
                let canonical = canonicalize_with(&link, inner.config.normalization.lowercase_path);
                inner.state.try_enqueue(&canonical, self.depth).await;
            }
        }
    }
}
