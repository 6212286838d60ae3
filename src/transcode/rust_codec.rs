//! Pure Rust codec built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless, RGBA) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality 1–100, RGB) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless only, RGBA) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, quality 1–100, RGBA) |
//!
//! The `image` WebP encoder has no lossy mode, so [`RustCodec::honors_quality`]
//! reports `false` for WebP and the size search is skipped for it.

use super::codec::{Codec, TranscodeError};
use super::params::{OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use std::sync::LazyLock;

/// Default rav1e speed. 1 is slowest/smallest, 10 fastest.
pub const DEFAULT_AVIF_SPEED: u8 = 6;

/// Extensions whose decoders are compiled in and known to work.
///
/// AVIF is deliberately excluded: the `image` crate's `"avif"` feature only enables the
/// **encoder** (rav1e). `ImageFormat::reading_enabled()` still returns `true` for AVIF
/// in that configuration, so we cannot rely on that API alone.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Production codec using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone)]
pub struct RustCodec {
    avif_speed: u8,
}

impl RustCodec {
    pub fn new() -> Self {
        Self {
            avif_speed: DEFAULT_AVIF_SPEED,
        }
    }

    pub fn with_avif_speed(speed: u8) -> Self {
        Self {
            avif_speed: speed.clamp(1, 10),
        }
    }
}

impl Default for RustCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_failure(format: OutputFormat) -> impl Fn(image::ImageError) -> TranscodeError {
    move |e| TranscodeError::EncodeFailure {
        format,
        reason: e.to_string(),
    }
}

impl Codec for RustCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TranscodeError> {
        let img =
            image::load_from_memory(bytes).map_err(|e| TranscodeError::Decode(e.to_string()))?;
        if img.width() == 0 || img.height() == 0 {
            return Err(TranscodeError::Decode("image has no pixels".into()));
        }
        Ok(img)
    }

    fn encode(
        &self,
        surface: &RgbaImage,
        format: OutputFormat,
        quality: f64,
    ) -> Result<Vec<u8>, TranscodeError> {
        let (width, height) = surface.dimensions();
        let q = Quality::from_unit(quality).value() as u8;
        let mut buf = Vec::new();

        match format {
            OutputFormat::Png => PngEncoder::new(&mut buf)
                .write_image(surface.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(encode_failure(format))?,
            OutputFormat::Jpeg => {
                // JPEG has no alpha; any background was composited upstream
                let rgb = DynamicImage::ImageRgba8(surface.clone()).into_rgb8();
                JpegEncoder::new_with_quality(&mut buf, q)
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(encode_failure(format))?
            }
            OutputFormat::WebP => WebPEncoder::new_lossless(&mut buf)
                .write_image(surface.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(encode_failure(format))?,
            OutputFormat::Avif => AvifEncoder::new_with_speed_quality(&mut buf, self.avif_speed, q)
                .write_image(surface.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(encode_failure(format))?,
        }

        if buf.is_empty() {
            return Err(TranscodeError::EncodeFailure {
                format,
                reason: "encoder produced no bytes".into(),
            });
        }
        Ok(buf)
    }

    fn honors_quality(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Jpeg | OutputFormat::Avif => true,
            OutputFormat::Png | OutputFormat::WebP => false,
        }
    }
}
