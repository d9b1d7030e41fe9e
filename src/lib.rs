//! Retouch - artifact cache and edit history for AI-assisted photo editing
//!
//! Every AI-assisted edit produces a new image file. Retouch keeps those
//! files on disk under a bounded cache, and tracks each editing session as an
//! undo/redo timeline over them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        EditorContext                          │
//! │                                                               │
//! │  import ──► ImageTransformer ──┐                              │
//! │                                ▼                              │
//! │  ┌──────────────────┐    ┌──────────────────────────────┐    │
//! │  │  HistoryManager  │    │        ArtifactStore         │    │
//! │  │  - active session│    │  - cache dir + JSON index    │    │
//! │  │  - undo / redo   │    │  - LRU eviction (80% band)   │    │
//! │  │  - recent (20)   │    │  - age expiry at startup     │    │
//! │  └──────────────────┘    │  - saved edits (unmanaged)   │    │
//! │           ▲              └──────────────────────────────┘    │
//! │           └──── record_edit ◄── EditBackend (remote AI)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`]: cache directory, persisted index, eviction and expiry
//! - [`history`]: editing sessions and their undo/redo timeline
//! - [`context`]: explicit context tying the two together
//! - [`preprocess`]: image transform collaborator interface
//! - [`backend`]: remote edit collaborator interface
//! - [`config`]: configuration management

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod preprocess;
pub mod store;

pub use config::RetouchConfig;
pub use context::EditorContext;
pub use error::{Error, Result};

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
