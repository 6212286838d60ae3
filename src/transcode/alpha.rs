//! Transparency detection.
//!
//! Used to decide whether a background fill is needed before encoding to a
//! format without an alpha channel. The check is bounded: the source is first
//! downsampled so its longest side is at most [`AlphaProbe::max_dimension`],
//! so a 50-megapixel upload costs the same as a thumbnail.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// Longest side, in pixels, that the probe ever scans.
pub const DEFAULT_PROBE_DIMENSION: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaProbe {
    pub max_dimension: u32,
}

impl Default for AlphaProbe {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_PROBE_DIMENSION,
        }
    }
}

impl AlphaProbe {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    /// Whether any sampled pixel is less than fully opaque.
    ///
    /// Fails closed: an image with no readable pixels reports `false`, so
    /// encoding proceeds without a background fill.
    pub fn has_transparency(&self, img: &DynamicImage) -> bool {
        if !img.color().has_alpha() {
            return false;
        }
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            log::warn!("alpha probe: source has no readable pixels, assuming opaque");
            return false;
        }

        let sample = if width.max(height) > self.max_dimension {
            // Nearest keeps isolated transparent pixels from being averaged away
            img.resize(self.max_dimension, self.max_dimension, FilterType::Nearest)
        } else {
            img.clone()
        };

        let rgba = sample.to_rgba8();
        rgba.as_raw().iter().skip(3).step_by(4).any(|&a| a < u8::MAX)
    }
}
