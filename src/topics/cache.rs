//! Persistent memo of topic categorization outcomes.
//!
//! Settled outcomes (matches and genuine no-matches) and transient
//! failures (oracle errors, unparsable or out-of-range replies) are kept in
//! separate sections of the cache file. A [`FileCacheStore`] opened with
//! failure retry enabled ignores the failure section, so those topics are
//! asked again while settled outcomes are reused.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Confidence, TopicMatch};
use crate::errors::AnalyticsError;

/// A memoized categorization outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The raw topic, kept so the file can be inspected and edited by hand.
    pub topic: String,
    pub matched_topic: Option<String>,
    pub confidence: Confidence,
}

impl CacheEntry {
    pub fn to_match(&self) -> TopicMatch {
        TopicMatch::new(self.matched_topic.clone(), self.confidence)
    }
}

/// Key/value store behind the categorizer.
pub trait CacheStore: Send {
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Records `entry`. Durable stores persist before returning.
    fn put(&mut self, key: String, entry: CacheEntry) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the cache key for a topic against a reference set.
///
/// The reference set is sorted first so its input order does not matter.
/// The topic is hashed verbatim, so `"Space"` and `"space"` differ.
pub fn cache_key(topic: &str, reference_topics: &[String]) -> String {
    let mut sorted: Vec<&str> = reference_topics.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    for reference in sorted {
        hasher.update([0x1f]);
        hasher.update(reference.as_bytes());
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for b in digest {
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    matches: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    failures: BTreeMap<String, CacheEntry>,
}

impl CacheFile {
    fn insert(&mut self, key: String, entry: CacheEntry) {
        if entry.confidence.is_transient() {
            self.matches.remove(&key);
            self.failures.insert(key, entry);
        } else {
            self.failures.remove(&key);
            self.matches.insert(key, entry);
        }
    }

    fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.matches.get(key).or_else(|| self.failures.get(key))
    }

    fn len(&self) -> usize {
        self.matches.len() + self.failures.len()
    }
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: CacheFile,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key, entry);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// JSON-file store. Every [`CacheStore::put`] rewrites the whole file.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    entries: CacheFile,
}

impl FileCacheStore {
    /// Opens the cache at `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or malformed
    /// file is logged and treated as empty. With `retry_failures`, cached
    /// transient failures are discarded so they get re-queried.
    pub fn load(path: impl AsRef<Path>, retry_failures: bool) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut entries = match Self::read(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load topic cache, starting empty");
                CacheFile::default()
            }
        };

        let discarded = if retry_failures {
            std::mem::take(&mut entries.failures).len()
        } else {
            0
        };

        info!(
            path = %path.display(),
            matches = entries.matches.len(),
            failures = entries.failures.len(),
            discarded_failures = discarded,
            "Topic cache loaded"
        );

        Self { path, entries }
    }

    fn read(path: &Path) -> Result<CacheFile> {
        if !path.exists() {
            return Ok(CacheFile::default());
        }

        let content = fs::read_to_string(path)?;
        let entries = serde_json::from_str(&content).map_err(|e| AnalyticsError::CacheFormat {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(entries)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key, entry);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Topic cache written");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
