use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use pregen_core::HandlerKey;

use crate::error::{CacheMiss, EngineError, Result};
use crate::response::CanonicalResponse;

/// The persisted unit: one per handler identity, always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: CanonicalResponse,
    /// Creation time, epoch milliseconds.
    pub stamp: i64,
}

impl CacheEntry {
    pub fn new(response: CanonicalResponse, stamp: i64) -> Self {
        Self { response, stamp }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.stamp
    }

    /// Fresh while strictly younger than the window.
    pub fn is_fresh(&self, now_ms: i64, window_secs: u64) -> bool {
        let window_ms = i64::try_from(window_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.age_ms(now_ms) < window_ms
    }
}

/// Storage for cache entries.
///
/// Reads and writes are blocking and scoped to one identity; a failure on one
/// entry must never affect another.
pub trait CacheStore: Send + Sync {
    /// Load the entry for `key`. Missing or unparseable entries are
    /// reported as [`EngineError::CacheRead`].
    fn load(&self, key: &HandlerKey) -> Result<CacheEntry>;

    fn save(&self, key: &HandlerKey, entry: &CacheEntry) -> Result<()>;

    /// Remove every persisted entry.
    fn clear(&self) -> Result<()>;
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// JSON files under a root directory, laid out by [`HandlerKey::cache_path`].
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &HandlerKey) -> PathBuf {
        self.root.join(key.cache_path())
    }
}

impl CacheStore for FileStore {
    fn load(&self, key: &HandlerKey) -> Result<CacheEntry> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::CacheRead {
                    key: key.clone(),
                    reason: CacheMiss::Missing,
                })
            }
            Err(e) => {
                return Err(EngineError::CacheRead {
                    key: key.clone(),
                    reason: CacheMiss::Corrupt(e.to_string()),
                })
            }
        };

        serde_json::from_str(&text).map_err(|e| EngineError::CacheRead {
            key: key.clone(),
            reason: CacheMiss::Corrupt(e.to_string()),
        })
    }

    fn save(&self, key: &HandlerKey, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let tmp = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, serde_json::to_vec(entry)?)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(path = %path.display(), stamp = entry.stamp, "cache entry written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for dir in ["commands", "components"] {
            match fs::remove_dir_all(self.root.join(dir)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(root = %self.root.display(), "cache cleared");
        Ok(())
    }
}

/// In-process store. Entries are kept serialized so reads exercise the same
/// parsing path as the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<HandlerKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text for `key`, bypassing serialization.
    pub fn insert_raw(&self, key: HandlerKey, text: impl Into<String>) {
        self.entries
            .lock()
            .expect("memory store poisoned")
            .insert(key, text.into());
    }

    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.entries
            .lock()
            .expect("memory store poisoned")
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &HandlerKey) -> Result<CacheEntry> {
        let entries = self.entries.lock().expect("memory store poisoned");
        let text = entries.get(key).ok_or_else(|| EngineError::CacheRead {
            key: key.clone(),
            reason: CacheMiss::Missing,
        })?;
        serde_json::from_str(text).map_err(|e| EngineError::CacheRead {
            key: key.clone(),
            reason: CacheMiss::Corrupt(e.to_string()),
        })
    }

    fn save(&self, key: &HandlerKey, entry: &CacheEntry) -> Result<()> {
        let text = serde_json::to_string(entry)?;
        self.entries
            .lock()
            .expect("memory store poisoned")
            .insert(key.clone(), text);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().expect("memory store poisoned").clear();
        Ok(())
    }
}
