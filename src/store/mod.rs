//! Artifact store — size- and age-bounded cache of derived images
//!
//! The store owns a cache directory and a JSON index describing every file
//! in it. Saved edits live in a separate, unmanaged directory that is never
//! evicted.

pub mod artifact_store;
pub mod key;
pub mod types;

pub use artifact_store::{ArtifactStore, INDEX_FILE_NAME};
pub use types::{format_bytes, CacheStats, IndexFile, StoreIndex, StoredEntry, INDEX_VERSION};
