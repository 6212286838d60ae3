//! Render pipeline: decoded source → target surface ready for encoding.
//!
//! 1. Decode the source bytes through the [`Codec`].
//! 2. Resolve the target box and [`Geometry`].
//! 3. Allocate an RGBA surface of exactly the target size, filled with the
//!    background (explicit, or implied for alpha-less formats) or cleared
//!    to transparent.
//! 4. Crop `source_rect`, resample to `dest_rect` (Lanczos3), apply filters.
//! 5. Composite onto the surface at the destination offset.
//!
//! The decoded source is dropped when [`RenderPipeline::render`] returns; only
//! the surface leaves this module.

use super::alpha::AlphaProbe;
use super::codec::{Codec, TranscodeError};
use super::geometry::{Geometry, Rect, resolve_geometry, resolve_target_size};
use super::params::{Color, Filters, OutputFormat, RenderOptions, SourceImage};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

/// Largest surface we are willing to allocate (16384 × 16384).
pub const MAX_SURFACE_PIXELS: u64 = 16_384 * 16_384;

/// A composited surface plus the plan that produced it.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub surface: RgbaImage,
    pub geometry: Geometry,
    /// The fill actually used, if any.
    pub background: Option<Color>,
}

pub struct RenderPipeline<'a, C: Codec> {
    codec: &'a C,
    alpha: AlphaProbe,
    default_background: Color,
}

impl<'a, C: Codec> RenderPipeline<'a, C> {
    pub fn new(codec: &'a C, alpha: AlphaProbe, default_background: Color) -> Self {
        Self {
            codec,
            alpha,
            default_background,
        }
    }

    /// Render `source` for encoding as `format`.
    ///
    /// `format` is the format that will actually be written (after any
    /// capability fallback), since it decides whether a background is implied.
    pub fn render(
        &self,
        source: &SourceImage,
        options: &RenderOptions,
        format: OutputFormat,
    ) -> Result<Rendered, TranscodeError> {
        let decoded = self.codec.decode(&source.bytes)?;
        let intrinsic = (decoded.width(), decoded.height());
        if intrinsic.0 == 0 || intrinsic.1 == 0 {
            return Err(TranscodeError::Decode(format!(
                "decoded image is empty ({}x{})",
                intrinsic.0, intrinsic.1
            )));
        }

        let target = resolve_target_size(intrinsic, options.width, options.height);
        let geometry = resolve_geometry(intrinsic, target, options.fit, options.anchor);

        let pixels = geometry.target_width as u64 * geometry.target_height as u64;
        if pixels > MAX_SURFACE_PIXELS {
            return Err(TranscodeError::Surface {
                width: geometry.target_width,
                height: geometry.target_height,
            });
        }

        let background = options
            .background
            .or_else(|| self.implied_background(&decoded, &geometry, format));
        let fill = background.unwrap_or(Color::TRANSPARENT);
        let mut surface = RgbaImage::from_pixel(
            geometry.target_width,
            geometry.target_height,
            fill.to_rgba(),
        );

        let mut region = sample_region(&decoded, &geometry);
        drop(decoded);
        if let Some(filters) = &options.filters {
            apply_filters(&mut region, filters);
        }

        let (dx, dy) = (geometry.dest_rect.x as i64, geometry.dest_rect.y as i64);
        if background.is_some() {
            imageops::overlay(&mut surface, &region, dx, dy);
        } else {
            imageops::replace(&mut surface, &region, dx, dy);
        }

        Ok(Rendered {
            surface,
            geometry,
            background,
        })
    }

    /// Fill needed when the output can't carry alpha but the render would
    /// contain some: a translucent source, or letterbox bars around it.
    fn implied_background(
        &self,
        decoded: &DynamicImage,
        geometry: &Geometry,
        format: OutputFormat,
    ) -> Option<Color> {
        if format.supports_alpha() {
            return None;
        }
        let letterboxed = geometry.dest_rect
            != Rect::new(
                0.0,
                0.0,
                geometry.target_width as f64,
                geometry.target_height as f64,
            );
        if letterboxed || self.alpha.has_transparency(decoded) {
            Some(self.default_background)
        } else {
            None
        }
    }
}

/// Crop the source window and resample it to the destination size.
fn sample_region(decoded: &DynamicImage, geometry: &Geometry) -> RgbaImage {
    let (src_w, src_h) = (decoded.width(), decoded.height());
    let src = geometry.source_rect;

    let crop_w = (src.width.round() as u32).clamp(1, src_w);
    let crop_h = (src.height.round() as u32).clamp(1, src_h);
    let crop_x = (src.x.round() as u32).min(src_w - crop_w);
    let crop_y = (src.y.round() as u32).min(src_h - crop_h);

    let dest_w = geometry.dest_rect.width as u32;
    let dest_h = geometry.dest_rect.height as u32;

    let cropped = if (crop_x, crop_y, crop_w, crop_h) == (0, 0, src_w, src_h) {
        decoded.clone()
    } else {
        decoded.crop_imm(crop_x, crop_y, crop_w, crop_h)
    };

    if (crop_w, crop_h) == (dest_w, dest_h) {
        cropped.into_rgba8()
    } else {
        cropped
            .resize_exact(dest_w, dest_h, FilterType::Lanczos3)
            .into_rgba8()
    }
}

/// Apply brightness, contrast and saturation in that order.
///
/// Brightness scales each channel, contrast scales distance from mid-grey,
/// saturation scales distance from Rec. 709 luma. Alpha is untouched.
pub fn apply_filters(img: &mut RgbaImage, filters: &Filters) {
    if filters.is_identity() {
        return;
    }
    let Filters {
        brightness,
        contrast,
        saturation,
    } = *filters;

    for pixel in img.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let c = [r, g, b].map(|v| {
            let v = v as f32 / 255.0 * brightness;
            (v - 0.5) * contrast + 0.5
        });
        let luma = 0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2];
        let [r, g, b] = c.map(|v| {
            let v = luma + (v - luma) * saturation;
            (v * 255.0).round().clamp(0.0, 255.0) as u8
        });
        pixel.0 = [r, g, b, a];
    }
}
