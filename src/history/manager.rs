//! Undo/redo state machine for editing sessions
//!
//! The manager performs no I/O. Files referenced by the timeline belong to
//! the caller, which releases them through the artifact store.

use super::types::{EditSession, ImageState};
use crate::config::DEFAULT_RECENT_CAPACITY;
use crate::error::{Error, Result};
use crate::now_millis;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Owns the active editing session and the recently finished ones
#[derive(Debug)]
pub struct HistoryManager {
    active: Option<EditSession>,
    /// Most recent first
    recent: VecDeque<EditSession>,
    recent_capacity: usize,
}

impl HistoryManager {
    /// Create a manager keeping at most `recent_capacity` finished sessions
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            active: None,
            recent: VecDeque::with_capacity(recent_capacity.min(64)),
            recent_capacity,
        }
    }

    /// Start a session anchored at `original`.
    ///
    /// A session already in progress is ended first (and archived if it has
    /// edits).
    pub fn start(&mut self, original: impl Into<PathBuf>) -> &EditSession {
        self.end();
        let session = EditSession::new(original.into(), now_millis());
        tracing::info!("Started editing session {}", session.id);
        self.active.insert(session)
    }

    /// Push a new state after the cursor.
    ///
    /// Any states after the cursor are discarded and returned so the caller
    /// can release their files.
    pub fn apply_edit(
        &mut self,
        location: impl Into<PathBuf>,
        tool: impl Into<String>,
    ) -> Result<Vec<ImageState>> {
        let session = self.active.as_mut().ok_or(Error::NoActiveSession)?;

        let discarded = session.history.split_off(session.cursor + 1);
        session
            .history
            .push(ImageState::edit(location.into(), now_millis(), tool));
        session.cursor = session.history.len() - 1;

        tracing::debug!(
            "Session {}: applied {:?} at step {} (discarded {})",
            session.id,
            session.current_state().tool,
            session.cursor,
            discarded.len()
        );
        Ok(discarded)
    }

    /// Step back one state. Returns whether the cursor moved.
    pub fn undo(&mut self) -> bool {
        match self.active.as_mut() {
            Some(session) if session.can_undo() => {
                session.cursor -= 1;
                true
            }
            _ => false,
        }
    }

    /// Step forward one state. Returns whether the cursor moved.
    pub fn redo(&mut self) -> bool {
        match self.active.as_mut() {
            Some(session) if session.can_redo() => {
                session.cursor += 1;
                true
            }
            _ => false,
        }
    }

    /// End the active session. Returns whether it was archived.
    pub fn end(&mut self) -> bool {
        let Some(session) = self.active.take() else {
            return false;
        };

        if session.history.len() <= 1 {
            tracing::debug!("Ended session {} without edits", session.id);
            return false;
        }

        tracing::info!(
            "Archived session {} with {} edits",
            session.id,
            session.edit_count()
        );
        self.recent.push_front(session);
        self.recent.truncate(self.recent_capacity);
        true
    }

    pub fn active(&self) -> Option<&EditSession> {
        self.active.as_ref()
    }

    pub fn current_ref(&self) -> Option<&Path> {
        self.active.as_ref().map(|s| s.current_ref())
    }

    pub fn current_state(&self) -> Option<&ImageState> {
        self.active.as_ref().map(|s| s.current_state())
    }

    pub fn can_undo(&self) -> bool {
        self.active.as_ref().is_some_and(|s| s.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.active.as_ref().is_some_and(|s| s.can_redo())
    }

    /// Finished sessions, most recent first
    pub fn recent_sessions(&self) -> impl Iterator<Item = &EditSession> {
        self.recent.iter()
    }

    pub fn recent_count(&self) -> usize {
        self.recent.len()
    }

    pub fn clear_recent(&mut self) {
        self.recent.clear();
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cursor_in_bounds(manager: &HistoryManager) {
        if let Some(session) = manager.active() {
            assert!(session.cursor() < session.history().len());
        }
    }

    #[test]
    fn test_start_session() {
        let mut manager = HistoryManager::default();
        let session = manager.start("orig.jpg");
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.cursor(), 0);

        assert_eq!(manager.current_ref(), Some(Path::new("orig.jpg")));
        assert!(!manager.can_undo());
        assert!(!manager.can_redo());
    }

    #[test]
    fn test_apply_undo_and_branch() {
        let mut manager = HistoryManager::default();
        manager.start("orig.jpg");

        manager.apply_edit("e1.jpg", "enhance").unwrap();
        assert_eq!(manager.active().unwrap().cursor(), 1);
        assert!(manager.can_undo());

        assert!(manager.undo());
        assert_eq!(manager.active().unwrap().cursor(), 0);
        assert_eq!(manager.current_ref(), Some(Path::new("orig.jpg")));

        let discarded = manager.apply_edit("e2.jpg", "crop").unwrap();
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].location, PathBuf::from("e1.jpg"));

        let session = manager.active().unwrap();
        let locations: Vec<_> = session.history().iter().map(|s| s.location.clone()).collect();
        assert_eq!(locations, vec![PathBuf::from("orig.jpg"), PathBuf::from("e2.jpg")]);
        assert_eq!(session.cursor(), 1);
        assert!(!manager.can_redo());
    }

    #[test]
    fn test_redo_truncation_length() {
        let mut manager = HistoryManager::default();
        manager.start("o.jpg");
        for i in 0..5 {
            manager.apply_edit(format!("e{}.jpg", i), "tool").unwrap();
        }
        manager.undo();
        manager.undo();
        manager.undo();
        let c = manager.active().unwrap().cursor();
        assert_eq!(c, 2);

        let discarded = manager.apply_edit("branch.jpg", "retouch").unwrap();
        assert_eq!(discarded.len(), 3);
        let session = manager.active().unwrap();
        assert_eq!(session.history().len(), c + 2);
        assert!(!session.references(Path::new("e4.jpg")));

        // Nothing left to redo into
        assert!(!manager.redo());
    }

    #[test]
    fn test_undo_redo_at_bounds_are_noops() {
        let mut manager = HistoryManager::default();
        assert!(!manager.undo());
        assert!(!manager.redo());

        manager.start("o.jpg");
        assert!(!manager.undo());
        assert!(!manager.redo());

        manager.apply_edit("e.jpg", "enhance").unwrap();
        assert!(!manager.redo());
        assert!(manager.undo());
        assert!(!manager.undo());
        assert!(manager.redo());
        assert_eq!(manager.current_ref(), Some(Path::new("e.jpg")));
        assert_cursor_in_bounds(&manager);
    }

    #[test]
    fn test_apply_without_session() {
        let mut manager = HistoryManager::default();
        assert!(matches!(
            manager.apply_edit("e.jpg", "enhance"),
            Err(Error::NoActiveSession)
        ));
    }

    #[test]
    fn test_cursor_stays_in_bounds() {
        let mut manager = HistoryManager::default();
        manager.start("o.jpg");
        let script = "aauurrruaurrauuuuar";
        for (i, op) in script.chars().enumerate() {
            match op {
                'a' => {
                    manager.apply_edit(format!("{}.jpg", i), "t").unwrap();
                }
                'u' => {
                    manager.undo();
                }
                _ => {
                    manager.redo();
                }
            }
            assert_cursor_in_bounds(&manager);
        }
    }

    #[test]
    fn test_end_archives_only_edited_sessions() {
        let mut manager = HistoryManager::default();
        manager.start("plain.jpg");
        assert!(!manager.end());
        assert_eq!(manager.recent_count(), 0);
        assert!(manager.active().is_none());

        manager.start("edited.jpg");
        manager.apply_edit("e.jpg", "enhance").unwrap();
        assert!(manager.end());
        assert_eq!(manager.recent_count(), 1);
        assert!(!manager.end());
    }

    #[test]
    fn test_archived_session_keeps_undone_edits() {
        let mut manager = HistoryManager::default();
        manager.start("o.jpg");
        manager.apply_edit("e.jpg", "enhance").unwrap();
        manager.undo();
        assert!(manager.end());
        let archived = manager.recent_sessions().next().unwrap();
        assert_eq!(archived.current_ref(), Path::new("o.jpg"));
        assert_eq!(archived.edit_count(), 1);
    }

    #[test]
    fn test_start_replaces_and_archives_previous() {
        let mut manager = HistoryManager::default();
        let first_id = manager.start("a.jpg").id.clone();
        manager.apply_edit("a1.jpg", "enhance").unwrap();

        manager.start("b.jpg");
        assert_eq!(manager.current_ref(), Some(Path::new("b.jpg")));
        assert_eq!(manager.recent_sessions().next().unwrap().id, first_id);
    }

    #[test]
    fn test_recent_sessions_bounded_most_recent_first() {
        let mut manager = HistoryManager::new(3);
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(manager.start(format!("{}.jpg", i)).id.clone());
            manager.apply_edit(format!("{}-e.jpg", i), "enhance").unwrap();
            manager.end();
        }

        let recent: Vec<&str> = manager.recent_sessions().map(|s| s.id.as_str()).collect();
        assert_eq!(recent, vec![ids[4].as_str(), ids[3].as_str(), ids[2].as_str()]);

        manager.clear_recent();
        assert_eq!(manager.recent_count(), 0);
    }
}
