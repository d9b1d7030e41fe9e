//! Artifact store data model and on-disk index format

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Version written into `cache_index.json`
pub const INDEX_VERSION: u32 = 1;

/// One file tracked by the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Index key
    #[serde(skip)]
    pub key: String,

    /// Location of the cached file
    #[serde(rename = "uri")]
    pub location: PathBuf,

    /// Insertion time (Unix millis)
    #[serde(rename = "createdAt", default)]
    pub created_at: u64,

    /// Last insertion or read (Unix millis)
    #[serde(rename = "timestamp")]
    pub last_accessed_at: u64,

    /// File size measured when the entry was created
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// In-memory index of cached files.
///
/// `total_size_bytes` always equals the sum of the entries' sizes; the only
/// way to change `entries` is through `insert`/`remove`, which keep the sum
/// in step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreIndex {
    entries: HashMap<String, StoredEntry>,
    total_size_bytes: u64,
}

impl StoreIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, returning the replaced one
    pub fn insert(&mut self, entry: StoredEntry) -> Option<StoredEntry> {
        self.total_size_bytes += entry.size_bytes;
        let replaced = self.entries.insert(entry.key.clone(), entry);
        if let Some(old) = &replaced {
            self.total_size_bytes -= old.size_bytes;
        }
        replaced
    }

    /// Remove an entry by key
    pub fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = &removed {
            self.total_size_bytes -= entry.size_bytes;
        }
        removed
    }

    pub fn get(&self, key: &str) -> Option<&StoredEntry> {
        self.entries.get(key)
    }

    /// Update an entry's last access time
    pub fn touch(&mut self, key: &str, now: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed_at = now;
                true
            }
            None => false,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Find the key of the entry stored at `location`
    pub fn key_for_location(&self, location: &Path) -> Option<String> {
        self.entries
            .values()
            .find(|e| e.location == location)
            .map(|e| e.key.clone())
    }

    /// Entry with the oldest last access time, skipping the keys in `exclude`
    pub fn least_recently_used(&self, exclude: &[String]) -> Option<&StoredEntry> {
        self.entries
            .values()
            .filter(|e| !exclude.contains(&e.key))
            .min_by_key(|e| e.last_accessed_at)
    }

    pub fn entries(&self) -> impl Iterator<Item = &StoredEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    /// Build an index from a decoded file, recomputing the running sum.
    ///
    /// Sizes whose sum does not fit in a `u64` mark the file as damaged and
    /// yield an empty index.
    pub fn from_file(file: IndexFile) -> Self {
        let sum = file
            .entries
            .values()
            .try_fold(0u64, |acc, e| acc.checked_add(e.size_bytes));
        if sum.is_none() {
            tracing::warn!("Index entry sizes overflow, treating index as corrupt");
            return Self::new();
        }

        let mut index = Self::new();
        for (key, mut entry) in file.entries {
            entry.key = key;
            if entry.created_at == 0 {
                entry.created_at = entry.last_accessed_at;
            }
            index.insert(entry);
        }
        if index.total_size_bytes != file.total_size {
            tracing::warn!(
                "Index total size {} does not match entries ({}), correcting",
                file.total_size,
                index.total_size_bytes
            );
        }
        index
    }

    /// Snapshot the index into its on-disk representation
    pub fn to_file(&self) -> IndexFile {
        IndexFile {
            version: INDEX_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            total_size: self.total_size_bytes,
        }
    }
}

/// JSON document persisted as `cache_index.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    /// Format version; absent in the unversioned layout
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub entries: HashMap<String, StoredEntry>,

    #[serde(default)]
    pub total_size: u64,
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
}

impl CacheStats {
    /// Share of the cap currently used, in percent
    pub fn usage_percent(&self) -> f64 {
        if self.max_size_bytes == 0 {
            return 0.0;
        }
        self.total_size_bytes as f64 * 100.0 / self.max_size_bytes as f64
    }
}

/// Render a byte count with a binary unit, e.g. `1.5 MiB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.1} {}", value, unit)
}
