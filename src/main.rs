//! CLI entry point.
//!
//! Grounded on the pack's `clap::Parser` derive binaries: flags map
//! directly onto [`crawlkeeper::ConfigBuilder`] setters, `anyhow` wraps
//! setup failures for a readable top-level error, and a `tracing_subscriber`
//! `fmt` + `EnvFilter` subscriber is installed before anything logs.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crawlkeeper::{AntiBotConfig, ConfigBuilder, FetchMode, PaginationConfig, Scheduler};
use tracing_subscriber::EnvFilter;

/// A resumable, polite web crawler.
#[derive(Debug, Parser)]
#[command(name = "crawlkeeper", about = "A resumable, polite web crawler")]
struct Cli {
    /// Seed URL to start crawling from.
    url: String,

    /// Use the bounded-concurrent scheduler instead of the sequential one.
    #[arg(long)]
    concurrent: bool,

    /// Maximum number of simultaneous in-flight fetches in concurrent mode.
    #[arg(long, default_value_t = 10)]
    max_concurrent_requests: usize,

    /// Delay between fetches, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: i64,

    /// Maximum link depth to follow from the seed.
    #[arg(long, default_value_t = 5)]
    max_depth: i64,

    /// Directory page artifacts are written under.
    #[arg(long, default_value = "scraped_content")]
    output_dir: PathBuf,

    /// Path to the durable frontier snapshot.
    #[arg(long, default_value = "crawl_state.json")]
    state_file: PathBuf,

    /// Restrict crawling to URLs under this host+path prefix; `none` disables scoping.
    #[arg(long)]
    scope_prefix: Option<String>,

    /// File extensions to exclude, comma-separated (e.g. "js,css,png").
    #[arg(long, value_delimiter = ',')]
    exclude_extensions: Vec<String>,

    /// CSS selectors used to find outgoing links, comma-separated.
    #[arg(long, value_delimiter = ',')]
    link_selectors: Vec<String>,

    /// Minimum text length (after stripping script/style) to keep a page.
    #[arg(long)]
    min_content_length: Option<usize>,

    /// Ignore robots.txt policy entirely.
    #[arg(long)]
    ignore_robots: bool,

    /// Lowercase the URL path during canonicalization.
    #[arg(long)]
    lowercase_path: bool,

    /// User-Agent string sent with every request.
    #[arg(long, default_value = "CrawlkeeperBot/1.0")]
    user_agent: String,

    /// Save a checkpoint every N processed URLs.
    #[arg(long, default_value_t = 10)]
    checkpoint_interval: u64,

    /// Attempt to extract readable article content alongside raw HTML.
    #[arg(long)]
    extract_content: bool,

    /// Where to write the final metrics JSON.
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Use the browser-driven fetcher instead of plain HTTP.
    #[arg(long)]
    browser: bool,

    /// Run the browser fetcher headless (only meaningful with --browser).
    #[arg(long)]
    headless: bool,

    /// Wait for an interactive login before crawling (browser mode only).
    #[arg(long)]
    wait_for_login: bool,

    /// Enable pagination (requires --browser and --pagination-selector).
    #[arg(long)]
    pagination: bool,

    /// CSS selector for the "next page" control.
    #[arg(long)]
    pagination_selector: Option<String>,

    /// Maximum number of pages to follow per paginated sequence.
    #[arg(long)]
    pagination_max_pages: Option<usize>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "crawlkeeper=info",
        1 => "crawlkeeper=debug",
        _ => "crawlkeeper=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let fetch_mode = if cli.browser { FetchMode::Browser } else { FetchMode::Http };

    let mut builder = ConfigBuilder::new()
        .with_url(cli.url)
        .with_concurrent(cli.concurrent)
        .with_max_concurrent_requests(cli.max_concurrent_requests)
        .with_delay_ms(cli.delay_ms)
        .with_max_depth(cli.max_depth)
        .with_output_dir(cli.output_dir)
        .with_state_file(cli.state_file)
        .with_exclude_extensions(cli.exclude_extensions)
        .with_link_selectors(cli.link_selectors)
        .with_ignore_robots(cli.ignore_robots)
        .with_lowercase_path(cli.lowercase_path)
        .with_user_agent(cli.user_agent)
        .with_checkpoint_interval(cli.checkpoint_interval)
        .with_extract_content(cli.extract_content)
        .with_fetch_mode(fetch_mode)
        .with_anti_bot(AntiBotConfig {
            headless: cli.headless,
            randomize_user_agent: false,
            wait_for_interactive_login: cli.wait_for_login,
        })
        .with_pagination(PaginationConfig {
            enabled: cli.pagination,
            next_page_selector: cli.pagination_selector,
            max_pages: cli.pagination_max_pages,
        });

    if let Some(scope) = cli.scope_prefix {
        builder = builder.with_scope_prefix(scope);
    }
    if let Some(min_len) = cli.min_content_length {
        builder = builder.with_min_content_length(min_len);
    }
    if let Some(metrics_file) = cli.metrics_file {
        builder = builder.with_metrics_file(metrics_file);
    }

    let config = builder.build().context("invalid crawl configuration")?;

    let scheduler = Scheduler::new(config)
        .await
        .context("failed to initialize scheduler")?;

    let ctrlc_scheduler = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, stopping crawl");
            ctrlc_scheduler.stop();
        }
    });

    let result = scheduler.start().await;
    scheduler.close().await;
    result.context("crawl failed")?;

    Ok(())
}
