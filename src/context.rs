//! Editor context
//!
//! One `EditorContext` is built at process start and handed to whatever
//! drives the editing flow. It owns the artifact store and the history
//! manager; initialization happens in [`EditorContext::open`], not as a side
//! effect of first use.

use crate::backend::{EditBackend, EditOutcome, EditRequest};
use crate::config::RetouchConfig;
use crate::error::{Error, Result};
use crate::history::{EditSession, HistoryManager, ImageState};
use crate::preprocess::ImageTransformer;
use crate::store::ArtifactStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide editing context.
///
/// Files referenced by the active session are pinned while edits are cached,
/// so eviction never removes an undo or redo target. Files only referenced by
/// finished sessions get no such protection.
pub struct EditorContext {
    config: RetouchConfig,
    store: Arc<ArtifactStore>,
    history: RwLock<HistoryManager>,
    transformer: Option<Arc<dyn ImageTransformer>>,
    preamble: Option<String>,
}

impl EditorContext {
    /// Validate `config`, open the artifact store and create an empty history
    pub async fn open(config: RetouchConfig) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::open(config.storage.clone()).await?;
        let history = HistoryManager::new(config.history.recent_capacity);
        Ok(Self {
            config,
            store: Arc::new(store),
            history: RwLock::new(history),
            transformer: None,
            preamble: None,
        })
    }

    /// Preprocess imported images with `transformer`
    pub fn with_transformer(mut self, transformer: Arc<dyn ImageTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// System preamble attached to every backend request
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn config(&self) -> &RetouchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Bring a captured or imported image into a new session.
    ///
    /// With a transformer attached, the image is normalized and the result
    /// cached; otherwise the session is anchored at `source` itself.
    pub async fn import(&self, source: &Path) -> Result<EditSession> {
        let original = match &self.transformer {
            Some(transformer) => {
                let processed = transformer.preprocess(source, &self.config.preprocess).await?;
                tracing::debug!(
                    "Preprocessed {} to {}x{} {}",
                    source.display(),
                    processed.width,
                    processed.height,
                    processed.mime_type
                );
                self.store
                    .cache_image(&processed.location, Some("import"))
                    .await?
            }
            None => source.to_path_buf(),
        };
        Ok(self.start_session(original).await)
    }

    /// Start a session at `original` without preprocessing
    pub async fn start_session(&self, original: impl Into<PathBuf>) -> EditSession {
        self.history.write().await.start(original).clone()
    }

    /// End the active session. Returns whether it was archived.
    pub async fn end_session(&self) -> bool {
        self.history.write().await.end()
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Push `result` onto the active session.
    ///
    /// With `persist`, the file is first copied into the cache and the cached
    /// copy is what the history references. Returns the referenced location.
    ///
    /// If the session is replaced while the file is being cached, the copy is
    /// dropped and the call fails with [`Error::NoActiveSession`].
    pub async fn record_edit(&self, result: &Path, tool: &str, persist: bool) -> Result<PathBuf> {
        let (session_id, pinned) = {
            let history = self.history.read().await;
            let session = history.active().ok_or(Error::NoActiveSession)?;
            let pinned: Vec<PathBuf> = session
                .history()
                .iter()
                .map(|s| s.location.clone())
                .collect();
            (session.id.clone(), pinned)
        };

        let location = if persist {
            self.store
                .cache_image_pinned(result, Some(tool), &pinned)
                .await?
        } else {
            result.to_path_buf()
        };

        self.apply_to_session(&session_id, location, tool, persist).await
    }

    /// Ask `backend` to edit the current image.
    ///
    /// An image in the outcome is cached and recorded under `tool`; the
    /// returned outcome then points at the cached copy. Text is passed
    /// through untouched.
    pub async fn run_edit(
        &self,
        backend: &dyn EditBackend,
        instruction: &str,
        tool: &str,
    ) -> Result<EditOutcome> {
        let current = self.current_ref().await.ok_or(Error::NoActiveSession)?;
        let mut request = EditRequest::new(current, instruction);
        if let Some(preamble) = &self.preamble {
            request = request.with_preamble(preamble.clone());
        }

        tracing::debug!("Sending {} edit to {}", tool, backend.name());
        let outcome = backend.edit(request).await?;

        match outcome.image {
            Some(image) => {
                let location = self.record_edit(&image, tool, true).await?;
                Ok(EditOutcome {
                    image: Some(location),
                    text: outcome.text,
                })
            }
            None => Ok(outcome),
        }
    }

    /// Step back. Returns the current image afterwards.
    pub async fn undo(&self) -> Option<PathBuf> {
        let mut history = self.history.write().await;
        history.undo();
        history.current_ref().map(Path::to_path_buf)
    }

    /// Step forward. Returns the current image afterwards.
    pub async fn redo(&self) -> Option<PathBuf> {
        let mut history = self.history.write().await;
        history.redo();
        history.current_ref().map(Path::to_path_buf)
    }

    pub async fn can_undo(&self) -> bool {
        self.history.read().await.can_undo()
    }

    pub async fn can_redo(&self) -> bool {
        self.history.read().await.can_redo()
    }

    /// Copy the current image into the saved-edits directory
    pub async fn save_current(&self, name: Option<&str>) -> Result<PathBuf> {
        let current = self.current_ref().await.ok_or(Error::NoActiveSession)?;
        self.store.save_edit(&current, name).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn current_ref(&self) -> Option<PathBuf> {
        self.history.read().await.current_ref().map(Path::to_path_buf)
    }

    /// Copy of the active session
    pub async fn snapshot(&self) -> Option<EditSession> {
        self.history.read().await.active().cloned()
    }

    /// Copies of the finished sessions, most recent first
    pub async fn recent_sessions(&self) -> Vec<EditSession> {
        self.history.read().await.recent_sessions().cloned().collect()
    }

    /// Append `location` to the session `session_id`, if it is still active
    async fn apply_to_session(
        &self,
        session_id: &str,
        location: PathBuf,
        tool: &str,
        cached: bool,
    ) -> Result<PathBuf> {
        let applied = {
            let mut history = self.history.write().await;
            if history.active().is_some_and(|s| s.id == session_id) {
                history.apply_edit(location.clone(), tool)
            } else {
                Err(Error::NoActiveSession)
            }
        };

        let discarded = match applied {
            Ok(discarded) => discarded,
            Err(e) => {
                if cached {
                    if let Err(err) = self.store.delete(&location).await {
                        tracing::warn!(
                            "Failed to drop unrecorded edit {}: {}",
                            location.display(),
                            err
                        );
                    }
                }
                return Err(e);
            }
        };

        if self.config.history.prune_discarded && !discarded.is_empty() {
            self.release(discarded).await;
        }
        Ok(location)
    }

    /// Delete cached files of discarded states nothing else points at
    async fn release(&self, discarded: Vec<ImageState>) {
        let doomed: Vec<PathBuf> = {
            let history = self.history.read().await;
            discarded
                .into_iter()
                .map(|s| s.location)
                .filter(|loc| self.store.is_managed(loc))
                .filter(|loc| {
                    !history.active().is_some_and(|s| s.references(loc))
                        && !history.recent_sessions().any(|s| s.references(loc))
                })
                .collect()
        };

        for location in doomed {
            if let Err(e) = self.store.delete(&location).await {
                tracing::warn!("Failed to release {}: {}", location.display(), e);
            }
        }
    }
}
