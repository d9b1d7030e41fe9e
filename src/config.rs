//! Retouch configuration management

use crate::error::{Error, Result};
use crate::preprocess::PreprocessOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cache cap (100 MiB)
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 100 * 1024 * 1024;

/// Default maximum entry age (7 days)
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Default number of archived sessions kept
pub const DEFAULT_RECENT_CAPACITY: usize = 20;

/// Main Retouch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetouchConfig {
    /// Artifact store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Edit history configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Options handed to the image transformer on import
    #[serde(default)]
    pub preprocess: PreprocessOptions,
}

impl RetouchConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the store and history manager cannot operate with
    pub fn validate(&self) -> Result<()> {
        let storage = &self.storage;
        if storage.max_cache_bytes == 0 {
            return Err(Error::Config("storage.max_cache_bytes must be positive".into()));
        }
        if !(storage.eviction_target_ratio > 0.0 && storage.eviction_target_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "storage.eviction_target_ratio must be in (0, 1], got {}",
                storage.eviction_target_ratio
            )));
        }
        if storage.cache_dir == storage.saved_dir {
            return Err(Error::Config(
                "storage.cache_dir and storage.saved_dir must differ".into(),
            ));
        }
        if self.history.recent_capacity == 0 {
            return Err(Error::Config("history.recent_capacity must be positive".into()));
        }
        let quality = self.preprocess.quality;
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(Error::Config(format!(
                "preprocess.quality must be in (0, 1], got {}",
                quality
            )));
        }
        Ok(())
    }
}

/// Which timestamp `cleanup_expired` measures age from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryBasis {
    /// Age counts from the most recent read or insertion
    #[default]
    LastAccess,
    /// Age counts from insertion regardless of reads
    Creation,
}

/// Artifact store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Managed cache directory (holds the index)
    pub cache_dir: PathBuf,

    /// Unmanaged directory for user-confirmed edits
    pub saved_dir: PathBuf,

    /// Aggregate size above which eviction starts
    pub max_cache_bytes: u64,

    /// Entries older than this are removed at initialization
    pub max_age_secs: u64,

    /// Eviction stops once the total is at or below `max_cache_bytes * ratio`
    pub eviction_target_ratio: f64,

    /// Age basis for expiry
    pub expiry_basis: ExpiryBasis,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::rooted_at(Self::default_root())
    }
}

impl StorageConfig {
    /// Default data root (~/.retouch/)
    pub fn default_root() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".retouch")
    }

    /// Config with both directories under `root` and default limits
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cache_dir: root.join("cache"),
            saved_dir: root.join("saved"),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            eviction_target_ratio: 0.8,
            expiry_basis: ExpiryBasis::default(),
        }
    }

    /// Size eviction brings the cache down to
    pub fn eviction_target_bytes(&self) -> u64 {
        (self.max_cache_bytes as f64 * self.eviction_target_ratio) as u64
    }

    /// Maximum age in milliseconds
    pub fn max_age_millis(&self) -> u64 {
        self.max_age_secs.saturating_mul(1000)
    }
}

/// Edit history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of finished sessions kept, most recent first
    pub recent_capacity: usize,

    /// Delete cached files of states dropped by redo truncation
    pub prune_discarded: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            prune_discarded: true,
        }
    }
}
