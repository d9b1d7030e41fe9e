//! Editing session data model

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One point on a session's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageState {
    /// Image file for this state
    pub location: PathBuf,
    /// When the state was created (Unix millis)
    pub timestamp: u64,
    /// Operation that produced the state; `None` for the original
    pub tool: Option<String>,
}

impl ImageState {
    pub fn original(location: PathBuf, timestamp: u64) -> Self {
        Self {
            location,
            timestamp,
            tool: None,
        }
    }

    pub fn edit(location: PathBuf, timestamp: u64, tool: impl Into<String>) -> Self {
        Self {
            location,
            timestamp,
            tool: Some(tool.into()),
        }
    }
}

/// An editing session: the original image plus an undo/redo timeline.
///
/// `history[0]` is always the original and `cursor` always indexes into
/// `history`. The current image is derived from the cursor, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SessionRecord")]
pub struct EditSession {
    pub id: String,
    pub started_at: u64,
    pub(crate) history: Vec<ImageState>,
    pub(crate) cursor: usize,
}

/// Unchecked wire form of [`EditSession`]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    id: String,
    started_at: u64,
    history: Vec<ImageState>,
    cursor: usize,
}

impl TryFrom<SessionRecord> for EditSession {
    type Error = String;

    fn try_from(record: SessionRecord) -> std::result::Result<Self, Self::Error> {
        if record.history.is_empty() {
            return Err(format!("session {} has no original image", record.id));
        }
        if record.cursor >= record.history.len() {
            return Err(format!(
                "session {} cursor {} is outside its {} states",
                record.id,
                record.cursor,
                record.history.len()
            ));
        }
        Ok(Self {
            id: record.id,
            started_at: record.started_at,
            history: record.history,
            cursor: record.cursor,
        })
    }
}

impl EditSession {
    pub(crate) fn new(original: PathBuf, now: u64) -> Self {
        Self {
            id: format!("session-{}", uuid::Uuid::new_v4()),
            started_at: now,
            history: vec![ImageState::original(original, now)],
            cursor: 0,
        }
    }

    /// The immutable starting image
    pub fn original_ref(&self) -> &Path {
        &self.history[0].location
    }

    /// Image at the cursor
    pub fn current_ref(&self) -> &Path {
        &self.current_state().location
    }

    pub fn current_state(&self) -> &ImageState {
        &self.history[self.cursor]
    }

    pub fn history(&self) -> &[ImageState] {
        &self.history
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// Number of edits on the timeline, including any redo tail
    pub fn edit_count(&self) -> usize {
        self.history.len() - 1
    }

    /// Tools in the order they were applied
    pub fn tools_used(&self) -> Vec<&str> {
        self.history.iter().filter_map(|s| s.tool.as_deref()).collect()
    }

    /// Whether any state on the timeline points at `location`
    pub fn references(&self, location: &Path) -> bool {
        self.history.iter().any(|s| s.location == location)
    }
}
