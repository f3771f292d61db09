//! The durable frontier: the in-memory `Frontier` plus its JSON
//! `StateStore`.
//!
//! A `VecDeque`-backed BFS queue, visited set, queued set, and discovery
//! depths all live behind a single owning mutex — no caller reaches into
//! the raw collections directly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StateStoreError;

/// A queued URL plus the depth at which it was discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlInfo {
    pub url: String,
    pub depth: u32,
}

/// The on-disk shape of the frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub visited: HashMap<String, bool>,
    pub queue: Vec<UrlInfo>,
    pub base_url: String,
    pub processed: u64,
    pub url_depths: HashMap<String, u32>,
    #[serde(default)]
    pub queued: HashMap<String, bool>,
}

/// The in-memory frontier. Not `Clone` — there is exactly one owner,
/// reached only through [`StateStore`]'s transactional methods.
#[derive(Debug, Default)]
struct Frontier {
    visited: HashSet<String>,
    queued: HashSet<String>,
    queue: VecDeque<UrlInfo>,
    url_depths: HashMap<String, u32>,
    base_url: String,
    processed: u64,
}

impl Frontier {
    fn from_persisted(p: PersistedState) -> Self {
        let mut queued: HashSet<String> = p.queued.into_keys().collect();
        // Backward compatibility: derive `queued` from `queue` if the
        // snapshot predates the `queued` field.
        if queued.is_empty() && !p.queue.is_empty() {
            queued = p.queue.iter().map(|u| u.url.clone()).collect();
        }
        Frontier {
            visited: p.visited.into_keys().collect(),
            queued,
            queue: p.queue.into(),
            url_depths: p.url_depths,
            base_url: p.base_url,
            processed: p.processed,
        }
    }

    fn to_persisted(&self) -> PersistedState {
        PersistedState {
            visited: self.visited.iter().map(|u| (u.clone(), true)).collect(),
            queue: self.queue.iter().cloned().collect(),
            base_url: self.base_url.clone(),
            processed: self.processed,
            url_depths: self.url_depths.clone(),
            queued: self.queued.iter().map(|u| (u.clone(), true)).collect(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.queued.intersection(&self.visited).next().is_none(),
            "queued and visited must be disjoint"
        );
        debug_assert!(
            self.queue.iter().all(|u| self.queued.contains(&u.url)),
            "every queued item must be tracked in `queued`"
        );
    }
}

/// A point-in-time, read-only view of the frontier, used for external
/// inspection and metrics.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub visited_count: usize,
    pub queued_count: usize,
    pub processed: u64,
    pub base_url: String,
}

/// Owns the frontier behind a single mutex and exposes only a small set of
/// transactional methods: `try_enqueue`, `pop`, `mark_visited`, `snapshot`.
pub struct StateStore {
    state_file: PathBuf,
    frontier: Mutex<Frontier>,
}

impl StateStore {
    /// Missing file → fresh empty state for the given seed; existing file
    /// → decode, reconstructing `queued` for backward compatibility if
    /// needed.
    pub async fn load(state_file: impl Into<PathBuf>, base_url: &str) -> Result<Self, StateStoreError> {
        let state_file = state_file.into();
        let frontier = match tokio::fs::read(&state_file).await {
            Ok(bytes) => {
                let persisted: PersistedState = serde_json::from_slice(&bytes)
                    .map_err(|e| StateStoreError::Parse(state_file.clone(), e))?;
                Frontier::from_persisted(persisted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Frontier {
                base_url: base_url.to_string(),
                ..Frontier::default()
            },
            Err(e) => return Err(StateStoreError::Read(state_file.clone(), e)),
        };
        frontier.assert_invariants();
        Ok(StateStore {
            state_file,
            frontier: Mutex::new(frontier),
        })
    }

    /// Seed the frontier with the base URL at depth 0, but only if the
    /// frontier is otherwise empty.
    pub async fn seed_if_empty(&self, canonical_seed: &str) {
        let mut f = self.frontier.lock().await;
        if f.queue.is_empty() && f.visited.is_empty() {
            f.queue.push_back(UrlInfo {
                url: canonical_seed.to_string(),
                depth: 0,
            });
            f.queued.insert(canonical_seed.to_string());
            f.url_depths.insert(canonical_seed.to_string(), 0);
        }
        f.assert_invariants();
    }

    /// Enqueue `url` at `depth` iff it is neither visited nor already
    /// queued. Returns whether it was enqueued. `url_depths` only ever
    /// records the *minimum* depth at which a URL was first discovered.
    pub async fn try_enqueue(&self, url: &str, depth: u32) -> bool {
        let mut f = self.frontier.lock().await;
        if f.visited.contains(url) || f.queued.contains(url) {
            return false;
        }
        f.queue.push_back(UrlInfo {
            url: url.to_string(),
            depth,
        });
        f.queued.insert(url.to_string());
        f.url_depths.entry(url.to_string()).or_insert(depth);
        f.assert_invariants();
        true
    }

    /// Pop the head of the queue and remove it from `queued`, atomically —
    /// the pop itself always happens under the frontier's lock, even in
    /// the concurrent scheduler.
    pub async fn pop(&self) -> Option<UrlInfo> {
        let mut f = self.frontier.lock().await;
        let item = f.queue.pop_front()?;
        f.queued.remove(&item.url);
        f.assert_invariants();
        Some(item)
    }

    /// Mark `url` visited, incrementing `processed`. Returns `false` (and
    /// leaves counters untouched) if it was already visited, so callers can
    /// implement an "already visited -> skip" branch.
    pub async fn mark_visited(&self, url: &str) -> bool {
        let mut f = self.frontier.lock().await;
        if f.visited.contains(url) {
            return false;
        }
        f.visited.insert(url.to_string());
        f.processed += 1;
        true
    }

    pub async fn is_visited(&self, url: &str) -> bool {
        self.frontier.lock().await.visited.contains(url)
    }

    pub async fn queue_is_empty(&self) -> bool {
        self.frontier.lock().await.queue.is_empty()
    }

    pub async fn queue_len(&self) -> usize {
        self.frontier.lock().await.queue.len()
    }

    pub async fn processed(&self) -> u64 {
        self.frontier.lock().await.processed
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let f = self.frontier.lock().await;
        StateSnapshot {
            visited_count: f.visited.len(),
            queued_count: f.queued.len(),
            processed: f.processed,
            base_url: f.base_url.clone(),
        }
    }

    /// Flush a consistent snapshot to disk. Errors are the caller's to log
    /// at `warn` — they never abort the crawl.
    pub async fn save(&self) -> Result<(), StateStoreError> {
        let persisted = {
            let f = self.frontier.lock().await;
            f.to_persisted()
        };
        self.save_persisted(&persisted).await
    }

    async fn save_persisted(&self, persisted: &PersistedState) -> Result<(), StateStoreError> {
        let json = serde_json::to_vec_pretty(persisted).map_err(StateStoreError::Serialize)?;
        let tmp_path = tmp_path_for(&self.state_file);
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| StateStoreError::Write(tmp_path.clone(), e))?;
        tokio::fs::rename(&tmp_path, &self.state_file)
            .await
            .map_err(|e| StateStoreError::Write(self.state_file.clone(), e))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| std::ffi::OsString::from("state.json"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_load_seeds_nothing_until_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path, "https://example.com/").await.unwrap();
        assert!(store.queue_is_empty().await);
        assert_eq!(store.processed().await, 0);
    }

    #[tokio::test]
    async fn seed_if_empty_only_seeds_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path, "https://example.com/").await.unwrap();
        store.seed_if_empty("https://example.com/").await;
        store.seed_if_empty("https://example.com/other").await;
        assert_eq!(store.queue_len().await, 1);
    }

    #[tokio::test]
    async fn try_enqueue_dedups_against_queued_and_visited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path, "https://example.com/").await.unwrap();
        assert!(store.try_enqueue("https://example.com/a", 1).await);
        assert!(!store.try_enqueue("https://example.com/a", 1).await);

        let popped = store.pop().await.unwrap();
        assert_eq!(popped.url, "https://example.com/a");
        store.mark_visited(&popped.url).await;
        assert!(!store.try_enqueue("https://example.com/a", 2).await);
    }

    #[tokio::test]
    async fn pop_removes_from_queued_so_it_can_be_requeued_after_visiting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path, "https://example.com/").await.unwrap();
        assert!(store.try_enqueue("https://example.com/a", 1).await);
        let popped = store.pop().await.unwrap();
        assert_eq!(popped.depth, 1);
        // Not yet visited and no longer queued: a duplicate discovery of the
        // same link before it is processed is allowed to re-enqueue it.
        assert!(store.try_enqueue("https://example.com/a", 2).await);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path, "https://example.com/").await.unwrap();
        store.seed_if_empty("https://example.com/").await;
        store.try_enqueue("https://example.com/a", 1).await;
        store.try_enqueue("https://example.com/b", 1).await;
        let popped = store.pop().await.unwrap();
        store.mark_visited(&popped.url).await;
        store.save().await.unwrap();

        let reloaded = StateStore::load(&path, "https://example.com/").await.unwrap();
        assert_eq!(reloaded.processed().await, 1);
        assert_eq!(reloaded.queue_len().await, 2);
        assert!(reloaded.is_visited(&popped.url).await);
    }

    #[tokio::test]
    async fn missing_queued_field_is_reconstructed_from_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let legacy = serde_json::json!({
            "visited": {},
            "queue": [{"url": "https://example.com/a", "depth": 0}],
            "base_url": "https://example.com/",
            "processed": 0,
            "url_depths": {"https://example.com/a": 0}
        });
        tokio::fs::write(&path, serde_json::to_vec(&legacy).unwrap())
            .await
            .unwrap();

        let store = StateStore::load(&path, "https://example.com/").await.unwrap();
        // `queued` was absent; it must be reconstructed so a subsequent
        // try_enqueue of the same URL is correctly rejected as a duplicate.
        assert!(!store.try_enqueue("https://example.com/a", 0).await);
    }
}
