//! Image transform collaborator
//!
//! Retouch never decodes pixels itself. Normalizing, resizing, cropping and
//! rotating are delegated to an [`ImageTransformer`] supplied by the host
//! application. Every operation takes a reference to a file and produces a
//! new file; the input is never modified.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output encoding for transformed images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// MIME type of the encoding
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Options for normalizing an image before it is cached or sent for editing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Maximum output width in pixels (aspect ratio is preserved)
    pub max_width: u32,

    /// Maximum output height in pixels (aspect ratio is preserved)
    pub max_height: u32,

    /// Encoder quality in `(0, 1]`; ignored for lossless formats
    pub quality: f32,

    /// Output encoding
    pub format: ImageFormat,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_width: 2048,
            max_height: 2048,
            quality: 0.85,
            format: ImageFormat::Jpeg,
        }
    }
}

/// Result of a preprocess call
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub location: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Encoded size, when the transformer measured it
    pub size_bytes: Option<u64>,
    pub mime_type: String,
}

/// Pixel rectangle for cropping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Quarter-turn rotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }
}

/// Mirror axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Horizontal,
    Vertical,
}

/// Image transform collaborator.
///
/// Implementations must treat their input as read-only and return a new
/// file. Failures should be reported as [`crate::Error::Preprocess`].
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    /// Resize and re-encode an image
    async fn preprocess(&self, source: &Path, options: &PreprocessOptions) -> Result<ProcessedImage>;

    /// Crop an image to the given region
    async fn crop(&self, source: &Path, region: CropRegion) -> Result<PathBuf>;

    /// Rotate an image by a quarter turn multiple
    async fn rotate(&self, source: &Path, rotation: Rotation) -> Result<PathBuf>;

    /// Mirror an image
    async fn flip(&self, source: &Path, direction: FlipDirection) -> Result<PathBuf>;

    /// Read pixel dimensions as `(width, height)`
    async fn dimensions(&self, source: &Path) -> Result<(u32, u32)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = PreprocessOptions::default();
        assert_eq!(options.max_width, 2048);
        assert_eq!(options.max_height, 2048);
        assert_eq!(options.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Webp.extension(), "webp");
    }

    #[test]
    fn test_options_partial_toml() {
        let options: PreprocessOptions = toml::from_str("max_width = 512\nformat = \"png\"").unwrap();
        assert_eq!(options.max_width, 512);
        assert_eq!(options.max_height, 2048);
        assert_eq!(options.format, ImageFormat::Png);
    }

    #[test]
    fn test_rotation_degrees() {
        assert_eq!(Rotation::Clockwise90.degrees(), 90);
        assert_eq!(Rotation::Clockwise270.degrees(), 270);
    }
}
