//! Disk-backed artifact store
//!
//! Directory layout:
//! ```text
//! <cache_dir>/
//! ├── cache_index.json
//! ├── <key>.<ext>
//! └── ...
//! <saved_dir>/
//! ├── <name>.<ext>
//! └── ...
//! ```
//!
//! Every mutation is a small transaction: the next index is built from a
//! copy of the current one, written to disk, and only then swapped into
//! memory. The index sits behind a `tokio::sync::Mutex` held for the whole
//! operation, so concurrent callers never interleave a read-modify-persist
//! cycle.

use super::key;
use super::types::{CacheStats, IndexFile, StoreIndex, StoredEntry, INDEX_VERSION};
use crate::config::{ExpiryBasis, StorageConfig};
use crate::error::{Error, Result};
use crate::now_millis;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Name of the persisted index inside the cache directory
pub const INDEX_FILE_NAME: &str = "cache_index.json";

const INDEX_TEMP_FILE_NAME: &str = "cache_index.json.tmp";

#[derive(Default)]
struct StoreState {
    index: StoreIndex,
    initialized: bool,
}

/// Size- and age-bounded store for derived image files
pub struct ArtifactStore {
    config: StorageConfig,
    state: Mutex<StoreState>,
}

impl ArtifactStore {
    /// Create a store without touching the filesystem.
    ///
    /// Call [`initialize`](Self::initialize) before any other operation.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Create and initialize a store
    pub async fn open(config: StorageConfig) -> Result<Self> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Path of the persisted index
    pub fn index_path(&self) -> PathBuf {
        self.config.cache_dir.join(INDEX_FILE_NAME)
    }

    /// Whether `location` is a file this store manages
    pub fn is_managed(&self, location: &Path) -> bool {
        location.starts_with(&self.config.cache_dir)
            && location.file_name().and_then(|n| n.to_str()) != Some(INDEX_FILE_NAME)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Prepare directories, load the index and drop expired entries.
    ///
    /// Idempotent. A missing or unreadable index is replaced by an empty one.
    /// Entries whose files are gone are pruned and files in the cache
    /// directory that no entry references are deleted.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(());
        }

        for dir in [&self.config.cache_dir, &self.config.saved_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::storage(format!("cannot create {}", dir.display()), e))?;
        }

        let mut index = self.load_index().await;
        let missing = self.prune_missing(&mut index).await;
        let orphans = self.remove_orphans(&index).await;

        // Rewrites a corrupt, legacy or missing index in the current format.
        if let Err(e) = self.persist(&index).await {
            tracing::warn!("Failed to persist reconciled cache index: {}", e);
        }

        state.index = index;
        state.initialized = true;

        let expired = self.cleanup_expired(&mut state, now_millis()).await;

        tracing::info!(
            "Artifact store ready at {}: {} entries, {} bytes ({} missing, {} orphaned, {} expired)",
            self.config.cache_dir.display(),
            state.index.len(),
            state.index.total_size_bytes(),
            missing,
            orphans,
            expired
        );
        Ok(())
    }

    /// Whether `initialize` has completed
    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    // =========================================================================
    // Cache operations
    // =========================================================================

    /// Copy `source` into the cache under a fresh key and return the copy's
    /// location.
    ///
    /// On failure the index is left as it was. Eviction runs before this
    /// returns, but never removes the entry just inserted.
    pub async fn cache_image(&self, source: &Path, tag: Option<&str>) -> Result<PathBuf> {
        self.cache_image_pinned(source, tag, &[]).await
    }

    /// Like [`cache_image`](Self::cache_image), but the eviction it triggers
    /// also skips cached files at the `pinned` locations.
    ///
    /// Pinned files may keep the cache above its eviction target until they
    /// are no longer pinned.
    pub async fn cache_image_pinned(
        &self,
        source: &Path,
        tag: Option<&str>,
        pinned: &[PathBuf],
    ) -> Result<PathBuf> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Err(Error::NotInitialized);
        }

        let now = now_millis();
        let mut cache_key = key::generate_key(source, tag, now);
        while state.index.contains_key(&cache_key) {
            cache_key = key::generate_key(source, tag, now);
        }
        let location = self
            .config
            .cache_dir
            .join(key::cache_file_name(&cache_key, source));

        let size_bytes = match tokio::fs::copy(source, &location).await {
            Ok(n) => n,
            Err(e) => {
                discard_partial(&location).await;
                return Err(Error::storage(
                    format!("failed to cache {}", source.display()),
                    e,
                ));
            }
        };

        let mut next = state.index.clone();
        next.insert(StoredEntry {
            key: cache_key.clone(),
            location: location.clone(),
            created_at: now,
            last_accessed_at: now,
            size_bytes,
        });
        if let Err(e) = self.commit(&mut state, next).await {
            discard_partial(&location).await;
            return Err(e);
        }

        tracing::debug!(
            "Cached {} as {} ({} bytes)",
            source.display(),
            cache_key,
            size_bytes
        );

        let mut protect: Vec<String> = pinned
            .iter()
            .filter_map(|p| state.index.key_for_location(p))
            .collect();
        protect.push(cache_key);
        self.evict_if_needed(&mut state, &protect).await;
        Ok(location)
    }

    /// Look up a cached file by key, refreshing its access time.
    ///
    /// An entry whose file has disappeared is dropped and reported as absent.
    pub async fn get_cached(&self, cache_key: &str) -> Option<PathBuf> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            tracing::warn!("get_cached({}) called before initialize", cache_key);
            return None;
        }

        let location = state.index.get(cache_key)?.location.clone();
        let mut next = state.index.clone();

        if !path_exists(&location).await {
            next.remove(cache_key);
            tracing::debug!("Pruned stale cache entry {}", cache_key);
            if let Err(e) = self.commit(&mut state, next).await {
                tracing::warn!("Failed to persist removal of {}: {}", cache_key, e);
            }
            return None;
        }

        next.touch(cache_key, now_millis());
        if let Err(e) = self.commit(&mut state, next).await {
            tracing::warn!("Failed to persist access time of {}: {}", cache_key, e);
        }
        Some(location)
    }

    /// Metadata for a key, without refreshing its access time
    pub async fn entry(&self, cache_key: &str) -> Option<StoredEntry> {
        self.state.lock().await.index.get(cache_key).cloned()
    }

    /// Delete a file and, when it is cached, its index entry.
    ///
    /// Deleting a file that does not exist is not an error.
    pub async fn delete(&self, location: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Err(Error::NotInitialized);
        }

        remove_file_if_exists(location)
            .await
            .map_err(|e| Error::storage(format!("failed to delete {}", location.display()), e))?;

        if let Some(cache_key) = state.index.key_for_location(location) {
            let mut next = state.index.clone();
            next.remove(&cache_key);
            self.commit(&mut state, next).await?;
            tracing::debug!("Deleted cache entry {}", cache_key);
        }
        Ok(())
    }

    /// Remove every cached file and reset the index. Saved edits are kept.
    pub async fn clear_cache(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Err(Error::NotInitialized);
        }

        let dir = &self.config.cache_dir;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::storage(format!("failed to clear {}", dir.display()), e)),
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::storage(format!("cannot create {}", dir.display()), e))?;

        let cleared = state.index.len();
        // The old index file went with the directory.
        state.index = StoreIndex::new();
        self.persist(&state.index).await?;

        tracing::info!("Cleared artifact cache ({} entries)", cleared);
        Ok(())
    }

    /// Current entry count and size. No I/O.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entry_count: state.index.len(),
            total_size_bytes: state.index.total_size_bytes(),
            max_size_bytes: self.config.max_cache_bytes,
        }
    }

    // =========================================================================
    // Saved edits
    // =========================================================================

    /// Copy `source` into the saved-edits directory.
    ///
    /// Saved edits are not indexed and never evicted. A caller-given name
    /// replaces an existing file of the same name.
    pub async fn save_edit(&self, source: &Path, name: Option<&str>) -> Result<PathBuf> {
        let dir = &self.config.saved_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::storage(format!("cannot create {}", dir.display()), e))?;

        let location = dir.join(key::saved_file_name(name, source, now_millis()));
        tokio::fs::copy(source, &location)
            .await
            .map_err(|e| Error::storage(format!("failed to save {}", source.display()), e))?;

        tracing::info!("Saved edit {}", location.display());
        Ok(location)
    }

    /// Files in the saved-edits directory, sorted by name.
    ///
    /// An unreadable directory yields an empty list.
    pub async fn list_saved_edits(&self) -> Vec<PathBuf> {
        let dir = &self.config.saved_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to read {}: {}", dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                        files.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to list {}: {}", dir.display(), e);
                    break;
                }
            }
        }
        files.sort();
        files
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop least-recently-used entries until the cache is back under the
    /// hysteresis target. Returns the number of entries evicted.
    async fn evict_if_needed(&self, state: &mut StoreState, protect: &[String]) -> usize {
        if state.index.total_size_bytes() <= self.config.max_cache_bytes {
            return 0;
        }

        let target = self.config.eviction_target_bytes();
        let mut next = state.index.clone();
        let mut evicted = 0;

        while next.total_size_bytes() > target {
            let Some(victim) = next.least_recently_used(protect).cloned() else {
                break;
            };
            if let Err(e) = remove_file_if_exists(&victim.location).await {
                tracing::warn!("Failed to delete evicted {}: {}", victim.location.display(), e);
            }
            next.remove(&victim.key);
            evicted += 1;
            tracing::debug!("Evicted {} ({} bytes)", victim.key, victim.size_bytes);
        }

        // Files are already gone; a stale on-disk entry is pruned on next load.
        if let Err(e) = self.persist(&next).await {
            tracing::warn!("Failed to persist cache index after eviction: {}", e);
        }
        state.index = next;

        tracing::info!(
            "Evicted {} entries, cache now {} bytes (cap {})",
            evicted,
            state.index.total_size_bytes(),
            self.config.max_cache_bytes
        );
        evicted
    }

    /// Remove entries older than the configured maximum age
    async fn cleanup_expired(&self, state: &mut StoreState, now: u64) -> usize {
        let max_age = self.config.max_age_millis();
        let basis = self.config.expiry_basis;
        let expired: Vec<StoredEntry> = state
            .index
            .entries()
            .filter(|e| {
                let since = match basis {
                    ExpiryBasis::LastAccess => e.last_accessed_at,
                    ExpiryBasis::Creation => e.created_at,
                };
                now.saturating_sub(since) > max_age
            })
            .cloned()
            .collect();

        if expired.is_empty() {
            return 0;
        }

        let mut next = state.index.clone();
        for entry in &expired {
            if let Err(e) = remove_file_if_exists(&entry.location).await {
                tracing::warn!("Failed to delete expired {}: {}", entry.location.display(), e);
            }
            next.remove(&entry.key);
            tracing::debug!("Expired {}", entry.key);
        }

        if let Err(e) = self.persist(&next).await {
            tracing::warn!("Failed to persist cache index after expiry: {}", e);
        }
        state.index = next;
        expired.len()
    }

    /// Drop entries whose backing file no longer exists
    async fn prune_missing(&self, index: &mut StoreIndex) -> usize {
        let mut missing = Vec::new();
        for entry in index.entries() {
            if !path_exists(&entry.location).await {
                missing.push(entry.key.clone());
            }
        }
        for cache_key in &missing {
            index.remove(cache_key);
            tracing::debug!("Pruned cache entry {} with missing file", cache_key);
        }
        missing.len()
    }

    /// Delete files in the cache directory that no entry references
    async fn remove_orphans(&self, index: &StoreIndex) -> usize {
        let dir = &self.config.cache_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to scan {} for orphans: {}", dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let name = entry.file_name();
            if name == INDEX_FILE_NAME || name == INDEX_TEMP_FILE_NAME {
                continue;
            }
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if index.entries().any(|e| e.location == path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!("Removed orphaned cache file {}", path.display());
                }
                Err(e) => tracing::warn!("Failed to remove orphan {}: {}", path.display(), e),
            }
        }
        removed
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Load the index from disk; anything unreadable yields an empty index
    async fn load_index(&self) -> StoreIndex {
        let path = self.index_path();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to read cache index {}: {}", path.display(), e);
                }
                return StoreIndex::new();
            }
        };

        let file: IndexFile = match serde_json::from_str(&data) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    "Cache index {} is corrupt, starting empty: {}",
                    path.display(),
                    e
                );
                return StoreIndex::new();
            }
        };

        if file.version > INDEX_VERSION {
            tracing::warn!(
                "Cache index {} has unsupported version {}, starting empty",
                path.display(),
                file.version
            );
            return StoreIndex::new();
        }

        StoreIndex::from_file(file)
    }

    /// Write the index atomically (temp file + rename)
    async fn persist(&self, index: &StoreIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(&index.to_file())?;
        let temp = self.config.cache_dir.join(INDEX_TEMP_FILE_NAME);
        let path = self.index_path();

        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| Error::storage(format!("failed to write {}", temp.display()), e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| Error::storage(format!("failed to replace {}", path.display()), e))?;
        Ok(())
    }

    /// Persist `next` and make it the in-memory index
    async fn commit(&self, state: &mut StoreState, next: StoreIndex) -> Result<()> {
        self.persist(&next).await?;
        state.index = next;
        Ok(())
    }
}

/// Remove a copy that never made it into the index
async fn discard_partial(location: &Path) {
    if let Err(e) = remove_file_if_exists(location).await {
        tracing::warn!("Failed to remove uncommitted {}: {}", location.display(), e);
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Remove a file, treating "not found" as success. Returns whether a file
/// was actually removed.
async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
