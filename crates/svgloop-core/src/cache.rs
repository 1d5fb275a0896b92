//! Content-addressed, file-backed response cache with a time-to-live.
//!
//! One JSON file per key: `{ "timestamp": <unix seconds>, "value": <json> }`. Expired or
//! corrupt entries are removed lazily on read, or eagerly via [`ResponseCache::sweep_expired`].
//! Writes go through a uniquely named temp file followed by a rename, so concurrent writers
//! never expose a half-written entry (last writer wins).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from(".cache/svgloop"),
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: u64,
    value: Value,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
    ttl: Duration,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ResponseCache {
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), ttl_secs = ttl.as_secs(), "response cache opened");
        Ok(Self { root, ttl })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Ok(Some(Self::open(
            &config.dir,
            Duration::from_secs(config.ttl_secs),
        )?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// SHA-256 over length-prefixed parts, so `("ab", "c")` and `("a", "bc")` differ.
    pub fn key(parts: &[&[u8]]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.timestamp) > self.ttl.as_secs()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                debug!(key, "cache miss");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "dropping corrupt cache entry");
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };
        if self.is_expired(&entry, now_secs()) {
            debug!(key, "cache entry expired");
            let _ = std::fs::remove_file(&path);
            return None;
        }
        debug!(key, "cache hit");
        Some(entry.value)
    }

    pub fn get_as<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.put_at(key, value, now_secs())
    }

    fn put_at(&self, key: &str, value: &Value, timestamp: u64) -> Result<()> {
        let entry = CacheEntry {
            timestamp,
            value: value.clone(),
        };
        let tmp = self
            .root
            .join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, serde_json::to_vec_pretty(&entry)?)?;
        if let Err(err) = std::fs::rename(&tmp, self.entry_path(key)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        debug!(key, "cache entry saved");
        Ok(())
    }

    fn entries(&self) -> Vec<PathBuf> {
        let Ok(read) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        read.flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect()
    }

    /// Removes expired and unreadable entries. Returns the number of files removed.
    pub fn sweep_expired(&self) -> usize {
        let now = now_secs();
        let mut removed = 0;
        for path in self.entries() {
            let expired = std::fs::read_to_string(&path)
                .ok()
                .and_then(|t| serde_json::from_str::<CacheEntry>(&t).ok())
                .is_none_or(|entry| self.is_expired(&entry, now));
            if expired && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Removes every entry. Returns the number of files removed.
    pub fn clear(&self) -> usize {
        self.entries()
            .into_iter()
            .filter(|p| std::fs::remove_file(p).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_values_within_ttl() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(tmp.path(), Duration::from_secs(60)).unwrap();
        let key = ResponseCache::key(&[b"analysis", b"image-bytes"]);
        assert!(cache.get(&key).is_none());

        cache.put(&key, &json!({ "shapes": ["circle"] })).unwrap();
        assert_eq!(cache.get(&key), Some(json!({ "shapes": ["circle"] })));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(tmp.path(), Duration::from_secs(10)).unwrap();
        let key = ResponseCache::key(&[b"k"]);
        cache.put_at(&key, &json!(1), now_secs() - 100).unwrap();

        assert!(cache.get(&key).is_none());
        assert!(!cache.entry_path(&key).exists());
    }

    #[test]
    fn sweep_and_clear_count_removed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(tmp.path(), Duration::from_secs(10)).unwrap();
        cache.put_at("old", &json!(1), now_secs() - 100).unwrap();
        cache.put("fresh", &json!(2)).unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{not json").unwrap();

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.get("fresh"), Some(json!(2)));
        assert_eq!(cache.clear(), 1);
    }

    #[test]
    fn keys_are_length_prefixed() {
        assert_ne!(
            ResponseCache::key(&[b"ab", b"c"]),
            ResponseCache::key(&[b"a", b"bc"])
        );
        assert_eq!(ResponseCache::key(&[b"x"]).len(), 64);
    }
}
