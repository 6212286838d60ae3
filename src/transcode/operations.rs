//! High-level transcode operation.
//!
//! [`Transcoder`] combines the pieces: resolve the output format against the
//! capability cache, render the surface, then either encode once or run the
//! constrained-size search.

use super::alpha::AlphaProbe;
use super::capability::CapabilityCache;
use super::codec::{Codec, TranscodeError};
use super::encoder::{EncodedResult, Encoder};
use super::geometry::Geometry;
use super::params::{Color, OutputFormat, RenderOptions, SourceImage};
use super::render::RenderPipeline;
use super::search::SizeSearch;
use std::sync::Arc;

/// Result type for transcode operations.
pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Policy knobs that don't change per request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeSettings {
    /// Written instead of a format the codec can't encode.
    pub fallback_format: OutputFormat,
    /// Fill used when an alpha-less format needs one and none was given.
    pub default_background: Color,
    pub alpha: AlphaProbe,
    pub search: SizeSearch,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            fallback_format: OutputFormat::Jpeg,
            default_background: Color::WHITE,
            alpha: AlphaProbe::default(),
            search: SizeSearch::default(),
        }
    }
}

/// Outcome of the size search, when one ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    pub target: u64,
    pub probes: u32,
    pub met_target: bool,
}

/// An encoded result plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcoded {
    pub result: EncodedResult,
    pub geometry: Geometry,
    pub search: Option<SearchSummary>,
}

pub struct Transcoder<C: Codec> {
    codec: C,
    capabilities: Arc<CapabilityCache>,
    settings: TranscodeSettings,
}

impl<C: Codec> Transcoder<C> {
    /// Transcoder with default settings and the process-wide capability cache.
    pub fn new(codec: C) -> Self {
        Self::with_settings(codec, TranscodeSettings::default())
    }

    pub fn with_settings(codec: C, settings: TranscodeSettings) -> Self {
        Self {
            codec,
            capabilities: CapabilityCache::global(),
            settings,
        }
    }

    /// Use a specific capability cache instead of the global one.
    pub fn with_capabilities(mut self, capabilities: Arc<CapabilityCache>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    pub fn settings(&self) -> &TranscodeSettings {
        &self.settings
    }

    /// Run one full transcode: render, encode, optionally fit a byte budget.
    pub fn transcode(&self, source: &SourceImage, options: &RenderOptions) -> Result<Transcoded> {
        log::debug!(
            "transcode: {} B source ({}) → {}",
            source.byte_size,
            source.mime.as_deref().unwrap_or("unknown type"),
            options.format
        );

        let encoder = Encoder::new(
            &self.codec,
            &self.capabilities,
            self.settings.fallback_format,
        );
        let (format, substitution) = encoder.resolve_format(options.format)?;

        let rendered = RenderPipeline::new(
            &self.codec,
            self.settings.alpha,
            self.settings.default_background,
        )
        .render(source, options, format)?;

        let quality = options.quality.as_unit();
        let (result, search) = match options.max_bytes {
            Some(target) if self.codec.honors_quality(format) => {
                let outcome = self.settings.search.run(quality, target, |q| {
                    encoder.encode_as(&rendered.surface, format, q, substitution)
                })?;
                if !outcome.met_target {
                    log::info!(
                        "{} B budget not reached; smallest {} is {} B",
                        target,
                        format,
                        outcome.result.byte_size
                    );
                }
                let summary = SearchSummary {
                    target,
                    probes: outcome.probes,
                    met_target: outcome.met_target,
                };
                (outcome.result, Some(summary))
            }
            Some(target) => {
                log::debug!("{format} ignores quality; {target} B budget not applied");
                let result = encoder.encode_as(&rendered.surface, format, quality, substitution)?;
                (result, None)
            }
            None => {
                let result = encoder.encode_as(&rendered.surface, format, quality, substitution)?;
                (result, None)
            }
        };

        Ok(Transcoded {
            result,
            geometry: rendered.geometry,
            search,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::codec::tests::{MockCodec, RecordedOp};
    use crate::transcode::encoder::FormatSubstitution;
    use crate::transcode::geometry::Rect;
    use crate::transcode::params::{FitMode, Quality};
    use image::{DynamicImage, Rgba, RgbaImage};

    fn transcoder(codec: MockCodec) -> Transcoder<MockCodec> {
        Transcoder::new(codec).with_capabilities(Arc::new(CapabilityCache::new()))
    }

    fn source() -> SourceImage {
        SourceImage::new(vec![7; 1234], Some("image/png".into()))
    }

    fn wide_opaque() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(1000, 500, Rgba([40, 80, 120, 255])))
    }

    #[test]
    fn single_encode_without_budget() {
        let t = transcoder(MockCodec::with_source(wide_opaque()));
        let out = t
            .transcode(
                &source(),
                &RenderOptions {
                    format: OutputFormat::Jpeg,
                    quality: Quality::new(60),
                    width: Some(500),
                    height: Some(500),
                    fit: FitMode::Cover,
                    ..RenderOptions::default()
                },
            )
            .unwrap();

        assert_eq!(out.result.byte_size, 6_000);
        assert_eq!(out.search, None);
        assert_eq!(out.geometry.source_rect, Rect::new(250.0, 0.0, 500.0, 500.0));
    }

    #[test]
    fn budget_triggers_search_for_lossy_format() {
        let t = transcoder(MockCodec::with_source(wide_opaque()));
        let out = t
            .transcode(
                &source(),
                &RenderOptions {
                    format: OutputFormat::Jpeg,
                    max_bytes: Some(3_000),
                    ..RenderOptions::default()
                },
            )
            .unwrap();

        assert!(out.result.byte_size <= 3_000);
        let summary = out.search.unwrap();
        assert!(summary.met_target);
        assert_eq!(summary.probes, 8);
    }

    #[test]
    fn budget_is_bypassed_for_lossless_format() {
        let codec = MockCodec::with_source(wide_opaque());
        let t = transcoder(codec);
        let out = t
            .transcode(
                &source(),
                &RenderOptions {
                    format: OutputFormat::Png,
                    max_bytes: Some(10),
                    ..RenderOptions::default()
                },
            )
            .unwrap();

        assert_eq!(out.search, None);
        // One capability probe + one real encode
        let encodes = t
            .codec()
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Encode { .. }))
            .count();
        assert_eq!(encodes, 2);
    }

    #[test]
    fn unsupported_format_reports_substitution() {
        let codec = MockCodec::with_source(wide_opaque()).without(&[OutputFormat::WebP]);
        let t = transcoder(codec);
        let out = t
            .transcode(
                &source(),
                &RenderOptions {
                    format: OutputFormat::WebP,
                    ..RenderOptions::default()
                },
            )
            .unwrap();

        assert_eq!(out.result.mime, "image/jpeg");
        assert_eq!(
            out.result.substitution,
            Some(FormatSubstitution {
                requested: OutputFormat::WebP,
                actual: OutputFormat::Jpeg
            })
        );
    }

    #[test]
    fn decode_error_surfaces() {
        let t = transcoder(MockCodec::new());
        let result = t.transcode(&source(), &RenderOptions::default());
        assert!(matches!(result, Err(TranscodeError::Decode(_))));
    }

    #[test]
    fn settings_fallback_is_respected() {
        let codec = MockCodec::with_source(wide_opaque()).without(&[OutputFormat::Avif]);
        let settings = TranscodeSettings {
            fallback_format: OutputFormat::Png,
            ..TranscodeSettings::default()
        };
        let t = Transcoder::with_settings(codec, settings)
            .with_capabilities(Arc::new(CapabilityCache::new()));
        let out = t
            .transcode(
                &source(),
                &RenderOptions {
                    format: OutputFormat::Avif,
                    ..RenderOptions::default()
                },
            )
            .unwrap();
        assert_eq!(out.result.format, OutputFormat::Png);
    }
}
