//! Codec trait and shared error type.
//!
//! The [`Codec`] trait covers the two pixel operations the pipeline cannot do
//! itself: turning source bytes into pixels, and turning a rendered surface
//! into bytes. Everything else (geometry, compositing, fallback policy, size
//! search) is codec-agnostic and lives in the sibling modules.
//!
//! The production implementation is
//! [`RustCodec`](super::rust_codec::RustCodec), built on the `image` crate.
//! Tests use the recording [`MockCodec`](tests::MockCodec), which lets a test
//! decide which formats "exist" and how many bytes each quality produces.

use super::params::OutputFormat;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode source: {0}")]
    Decode(String),
    #[error("No encoder available for {requested} (fallback {fallback} is unavailable too)")]
    UnsupportedFormat {
        requested: OutputFormat,
        fallback: OutputFormat,
    },
    #[error("Encoding {format} failed: {reason}")]
    EncodeFailure {
        format: OutputFormat,
        reason: String,
    },
    #[error("Cannot allocate a {width}x{height} rendering surface")]
    Surface { width: u32, height: u32 },
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Pixel-level codec operations.
///
/// `Sync` so one codec can serve rayon workers and blocking render tasks.
pub trait Codec: Sync {
    /// Decode source bytes into pixels.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TranscodeError>;

    /// Encode an RGBA surface. `quality` is on the codec scale (0.01–1.0) and
    /// is ignored by formats that don't honor it.
    fn encode(
        &self,
        surface: &RgbaImage,
        format: OutputFormat,
        quality: f64,
    ) -> Result<Vec<u8>, TranscodeError>;

    /// Whether `quality` actually changes the output for `format`.
    ///
    /// The size search is skipped for formats where it doesn't.
    fn honors_quality(&self, format: OutputFormat) -> bool {
        format.is_lossy()
    }
}
