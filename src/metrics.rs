//! Monotonic counters plus periodic snapshots. Has no effect on control
//! flow beyond the progress-emission throttle in [`crate::scheduler`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lock-free counters, each independently monotonic. A `Mutex` around a
/// plain struct would give the same externally observable behavior;
/// atomics do it with less contention while keeping each increment a
/// single indivisible operation.
#[derive(Default)]
struct Counters {
    urls_processed: AtomicU64,
    urls_saved: AtomicU64,
    urls_skipped: AtomicU64,
    urls_errored: AtomicU64,
    bytes_downloaded: AtomicU64,
    robots_blocked: AtomicU64,
    depth_limit_hits: AtomicU64,
    content_filtered: AtomicU64,
}

pub struct Metrics {
    counters: Counters,
    start_time: DateTime<Utc>,
    started_at: Instant,
}

/// The metrics-file shape written at the end of a crawl.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub urls_processed: u64,
    pub urls_saved: u64,
    pub urls_skipped: u64,
    pub urls_errored: u64,
    pub bytes_downloaded: u64,
    pub robots_blocked: u64,
    pub depth_limit_hits: u64,
    pub content_filtered: u64,
    pub pages_per_second: f64,
    pub queue_size: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            counters: Counters::default(),
            start_time: Utc::now(),
            started_at: Instant::now(),
        }
    }

    pub fn record_processed(&self) {
        self.counters.urls_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_saved(&self, bytes: u64) {
        self.counters.urls_saved.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.counters.urls_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_errored(&self) {
        self.counters.urls_errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_robots_blocked(&self) {
        self.counters.robots_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_depth_limit_hit(&self) {
        self.counters.depth_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_content_filtered(&self) {
        self.counters.content_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_size: u64) -> MetricsSnapshot {
        let end_time = Utc::now();
        let duration_seconds = self.started_at.elapsed().as_secs_f64();
        let urls_processed = self.counters.urls_processed.load(Ordering::Relaxed);
        let pages_per_second = if duration_seconds > 0.0 {
            urls_processed as f64 / duration_seconds
        } else {
            0.0
        };
        MetricsSnapshot {
            start_time: self.start_time,
            end_time,
            duration_seconds,
            urls_processed,
            urls_saved: self.counters.urls_saved.load(Ordering::Relaxed),
            urls_skipped: self.counters.urls_skipped.load(Ordering::Relaxed),
            urls_errored: self.counters.urls_errored.load(Ordering::Relaxed),
            bytes_downloaded: self.counters.bytes_downloaded.load(Ordering::Relaxed),
            robots_blocked: self.counters.robots_blocked.load(Ordering::Relaxed),
            depth_limit_hits: self.counters.depth_limit_hits.load(Ordering::Relaxed),
            content_filtered: self.counters.content_filtered.load(Ordering::Relaxed),
            pages_per_second,
            queue_size,
        }
    }
}

impl MetricsSnapshot {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let m = Metrics::new();
        m.record_processed();
        m.record_processed();
        m.record_saved(1000);
        m.record_errored();
        m.record_robots_blocked();
        m.record_depth_limit_hit();
        m.record_content_filtered();
        m.record_skipped();

        let snap = m.snapshot(5);
        assert_eq!(snap.urls_processed, 2);
        assert_eq!(snap.urls_saved, 1);
        assert_eq!(snap.bytes_downloaded, 1000);
        assert_eq!(snap.urls_errored, 1);
        assert_eq!(snap.robots_blocked, 1);
        assert_eq!(snap.depth_limit_hits, 1);
        assert_eq!(snap.content_filtered, 1);
        assert_eq!(snap.urls_skipped, 1);
        assert_eq!(snap.queue_size, 5);
    }

    #[test]
    fn snapshot_serializes_with_exact_field_names() {
        let m = Metrics::new();
        let snap = m.snapshot(0);
        let json = snap.to_json_pretty().unwrap();
        for field in [
            "start_time",
            "end_time",
            "duration_seconds",
            "urls_processed",
            "urls_saved",
            "urls_skipped",
            "urls_errored",
            "bytes_downloaded",
            "robots_blocked",
            "depth_limit_hits",
            "content_filtered",
            "pages_per_second",
            "queue_size",
        ] {
            assert!(json.contains(field), "missing field {field}");
        }
    }
}
