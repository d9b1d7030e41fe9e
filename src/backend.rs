//! Remote edit collaborator
//!
//! An [`EditBackend`] receives the current image together with an
//! instruction and answers with a new image, free text, or both. Retouch
//! does not inspect the text; it only needs the image to extend the
//! session history.

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Request sent to an edit backend
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    /// Image the instruction applies to
    pub image: PathBuf,
    /// What the user asked for
    pub instruction: String,
    /// System preamble framing the instruction
    pub preamble: Option<String>,
}

impl EditRequest {
    pub fn new(image: impl Into<PathBuf>, instruction: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            instruction: instruction.into(),
            preamble: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }
}

/// Backend answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    /// Edited image, when the backend produced one
    pub image: Option<PathBuf>,
    /// Free text or structured payload, passed through untouched
    pub text: Option<String>,
}

impl EditOutcome {
    pub fn image(location: impl Into<PathBuf>) -> Self {
        Self {
            image: Some(location.into()),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            image: None,
            text: Some(text.into()),
        }
    }
}

/// Remote multimodal service that performs edits.
///
/// Failures should be reported as [`crate::Error::Backend`].
#[async_trait]
pub trait EditBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Perform one edit
    async fn edit(&self, request: EditRequest) -> Result<EditOutcome>;
}
