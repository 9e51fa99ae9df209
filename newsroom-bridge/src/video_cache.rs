//! Generated clip cache
//!
//! Remembers which clip was generated for which article so the same story is
//! not synthesized twice. Entries live under `video_<articleId>` with the
//! clip URL, the prompt, and the generation time in epoch milliseconds, and
//! are pruned once they are older than 24 hours.
//!
//! A failed write is treated as storage exhaustion: stale entries are
//! pruned and the write is retried once.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default retention for cached clips
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "video_";

/// A cached clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVideo {
    pub url: String,
    pub prompt: String,
    /// Generation time, epoch milliseconds
    pub generated: i64,
}

/// Backing storage for the cache
pub trait CacheStore: Send {
    fn load(&self) -> BridgeResult<BTreeMap<String, CachedVideo>>;

    fn save(&mut self, entries: &BTreeMap<String, CachedVideo>) -> BridgeResult<()>;
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<user cache dir>/newsroom/video_cache.json`
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::cache_dir()?;
        path.push("newsroom");
        path.push("video_cache.json");
        Some(path)
    }
}

impl CacheStore for FileStore {
    fn load(&self) -> BridgeResult<BTreeMap<String, CachedVideo>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| BridgeError::Storage(format!("corrupt cache file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(BridgeError::Storage(e.to_string())),
        }
    }

    fn save(&mut self, entries: &BTreeMap<String, CachedVideo>) -> BridgeResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| BridgeError::Storage(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| BridgeError::Storage(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| BridgeError::Storage(e.to_string()))
    }
}

/// In-memory store with an optional entry quota
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, CachedVideo>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(quota),
        }
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> BridgeResult<BTreeMap<String, CachedVideo>> {
        Ok(self.entries.clone())
    }

    fn save(&mut self, entries: &BTreeMap<String, CachedVideo>) -> BridgeResult<()> {
        if let Some(quota) = self.quota {
            if entries.len() > quota {
                return Err(BridgeError::Storage(format!(
                    "quota of {} entries exceeded",
                    quota
                )));
            }
        }
        self.entries = entries.clone();
        Ok(())
    }
}

/// Clip cache keyed by article id
pub struct VideoCache {
    store: Box<dyn CacheStore>,
    entries: BTreeMap<String, CachedVideo>,
    max_age: Duration,
}

impl VideoCache {
    /// Open a cache, dropping entries that are already stale
    pub fn open(store: Box<dyn CacheStore>, max_age: Duration, now_ms: i64) -> Self {
        let entries = match store.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load clip cache, starting fresh: {}", e);
                BTreeMap::new()
            }
        };
        let mut cache = Self {
            store,
            entries,
            max_age,
        };
        let pruned = cache.prune(now_ms);
        if pruned > 0 {
            info!("Pruned {} stale clip cache entries", pruned);
            if let Err(e) = cache.store.save(&cache.entries) {
                warn!("Failed to persist pruned clip cache: {}", e);
            }
        }
        cache
    }

    pub fn key(article_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, article_id)
    }

    fn is_stale(&self, entry: &CachedVideo, now_ms: i64) -> bool {
        now_ms.saturating_sub(entry.generated) > self.max_age.as_millis() as i64
    }

    /// Look up a fresh clip for an article
    pub fn get(&self, article_id: &str, now_ms: i64) -> Option<&CachedVideo> {
        self.entries
            .get(&Self::key(article_id))
            .filter(|entry| !self.is_stale(entry, now_ms))
    }

    /// Store a clip; on failure prune stale entries and retry once
    pub fn put(&mut self, article_id: &str, entry: CachedVideo, now_ms: i64) -> BridgeResult<()> {
        let key = Self::key(article_id);
        let previous = self.entries.insert(key.clone(), entry);

        match self.store.save(&self.entries) {
            Ok(()) => return Ok(()),
            Err(e) => debug!("Clip cache write failed ({}), pruning and retrying", e),
        }

        self.prune(now_ms);
        match self.store.save(&self.entries) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Keep memory consistent with what is persisted
                match previous {
                    Some(previous) => self.entries.insert(key, previous),
                    None => self.entries.remove(&key),
                };
                Err(e)
            }
        }
    }

    /// Drop entries older than the retention window, returning how many
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let before = self.entries.len();
        let max_age_ms = self.max_age.as_millis() as i64;
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.generated) <= max_age_ms);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn clip(url: &str, generated: i64) -> CachedVideo {
        CachedVideo {
            url: url.into(),
            prompt: "anchor reads the news".into(),
            generated,
        }
    }

    #[test]
    fn test_put_and_get() {
        let now = 100 * HOUR_MS;
        let mut cache = VideoCache::open(Box::new(MemoryStore::default()), DEFAULT_MAX_AGE, now);
        cache.put("a1", clip("https://cdn/a1.mp4", now), now).unwrap();

        assert_eq!(cache.get("a1", now).unwrap().url, "https://cdn/a1.mp4");
        assert!(cache.get("a2", now).is_none());
        assert_eq!(VideoCache::key("a1"), "video_a1");
    }

    #[test]
    fn test_stale_entries_ignored_and_pruned() {
        let now = 100 * HOUR_MS;
        let mut cache = VideoCache::open(Box::new(MemoryStore::default()), DEFAULT_MAX_AGE, now);
        cache.put("old", clip("old.mp4", now - 25 * HOUR_MS), now).unwrap();
        cache.put("new", clip("new.mp4", now - HOUR_MS), now).unwrap();

        assert!(cache.get("old", now).is_none());
        assert!(cache.get("new", now).is_some());
        assert_eq!(cache.prune(now), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_write_failure_prunes_and_retries_once() {
        let now = 100 * HOUR_MS;
        let mut cache = VideoCache::open(Box::new(MemoryStore::with_quota(2)), DEFAULT_MAX_AGE, now);
        cache.put("stale", clip("s.mp4", now - 30 * HOUR_MS), now - 30 * HOUR_MS).unwrap();
        cache.put("fresh", clip("f.mp4", now), now).unwrap();

        // Third entry exceeds the quota until the stale one is pruned
        cache.put("newest", clip("n.mp4", now), now).unwrap();
        assert!(cache.get("newest", now).is_some());
        assert!(cache.get("fresh", now).is_some());
        assert_eq!(cache.len(), 2);

        // Nothing stale left: the retry fails too and the entry is not kept
        let err = cache.put("overflow", clip("o.mp4", now), now).unwrap_err();
        assert!(matches!(err, BridgeError::Storage(_)));
        assert!(cache.get("overflow", now).is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let path = std::env::temp_dir().join(format!("newsroom_cache_{}.json", uuid::Uuid::new_v4()));
        let now = 10 * HOUR_MS;
        {
            let mut cache = VideoCache::open(Box::new(FileStore::new(&path)), DEFAULT_MAX_AGE, now);
            cache.put("a1", clip("a1.mp4", now), now).unwrap();
        }
        let reopened = VideoCache::open(Box::new(FileStore::new(&path)), DEFAULT_MAX_AGE, now);
        assert_eq!(reopened.get("a1", now).unwrap().url, "a1.mp4");

        let _ = std::fs::remove_file(&path);
    }
}
