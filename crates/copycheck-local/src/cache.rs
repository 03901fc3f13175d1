//! Time-bounded memo of search results, keyed by the literal query text.
//!
//! Two backends share one interface: an in-process map (default) and a directory of JSON files
//! that survives restarts. Both evict lazily: an expired entry is dropped when it is next read.

use copycheck_core::SearchResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Test clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Concurrency-safe search-result cache. Last writer wins on key collision.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<SearchResult>>;
    fn set(&self, key: &str, value: Vec<SearchResult>, ttl: Duration);
    fn remove(&self, key: &str);
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<SearchResult>,
    pub expires_at: SystemTime,
}

pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until they are next read.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<SearchResult>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                None => return None,
                Some(e) if now < e.expires_at => return Some(e.value.clone()),
                Some(_) => {}
            }
        }
        // Expired: re-check under the write lock, a concurrent writer may have refreshed it.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(e) if now < e.expires_at => Some(e.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Vec<SearchResult>, ttl: Duration) {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at: self.clock.now() + ttl,
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FsEntry {
    schema_version: u32,
    key: String,
    expires_at_epoch_ms: u64,
    results: Vec<SearchResult>,
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// File-backed cache: one JSON file per query under `root/ab/cd/<sha256>.json`.
///
/// IO and parse errors are logged and read as a miss; the pipeline never fails on cache trouble.
pub struct FsCache {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    tmp_seq: AtomicU64,
}

impl FsCache {
    pub fn new(root: PathBuf) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            root,
            clock,
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("copycheck-cache")
    }

    fn key_hash(key: &str) -> String {
        let mut h = Sha256::new();
        h.update(b"search:");
        h.update(key.as_bytes());
        hex::encode(h.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let k = Self::key_hash(key);
        self.root
            .join(&k[0..2])
            .join(&k[2..4])
            .join(format!("{k}.json"))
    }

    fn write_entry(&self, path: &Path, entry: &FsEntry) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
        // Write-then-rename so concurrent readers never see a torn file.
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.tmp-{}-{seq}", std::process::id()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

impl ResultCache for FsCache {
    fn get(&self, key: &str) -> Option<Vec<SearchResult>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache read failed");
                return None;
            }
        };
        let entry: FsEntry = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache entry unreadable; dropping");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if entry.key != key {
            return None;
        }
        if epoch_ms(self.clock.now()) >= entry.expires_at_epoch_ms {
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(entry.results)
    }

    fn set(&self, key: &str, value: Vec<SearchResult>, ttl: Duration) {
        let path = self.path_for(key);
        let entry = FsEntry {
            schema_version: 1,
            key: key.to_string(),
            expires_at_epoch_ms: epoch_ms(self.clock.now() + ttl),
            results: value,
        };
        if let Err(e) = self.write_entry(&path, &entry) {
            tracing::warn!(path = %path.display(), error = %e, "cache write failed");
        }
    }

    fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }
}
