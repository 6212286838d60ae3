//! Surface → bytes, with capability-aware format fallback.
//!
//! When the requested format can't be encoded by the running codec, the
//! encoder silently switches to the configured fallback format (JPEG unless
//! configured otherwise). The switch is not an error: it is logged at `warn`
//! and recorded in [`EncodedResult::substitution`] so callers can show it
//! without parsing log output.

use super::capability::CapabilityCache;
use super::codec::{Codec, TranscodeError};
use super::params::{OutputFormat, Quality};
use image::RgbaImage;

/// Record of a fallback: what was asked for and what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSubstitution {
    pub requested: OutputFormat,
    pub actual: OutputFormat,
}

/// Final output of a transcode. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedResult {
    pub bytes: Vec<u8>,
    pub byte_size: u64,
    pub mime: &'static str,
    pub format: OutputFormat,
    /// Quality the bytes were encoded at; `None` when the format ignores it.
    pub quality: Option<Quality>,
    pub substitution: Option<FormatSubstitution>,
}

impl EncodedResult {
    /// `stem` with the extension of the format actually written.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.format.extension())
    }
}

pub struct Encoder<'a, C: Codec> {
    codec: &'a C,
    capabilities: &'a CapabilityCache,
    fallback: OutputFormat,
}

impl<'a, C: Codec> Encoder<'a, C> {
    pub fn new(codec: &'a C, capabilities: &'a CapabilityCache, fallback: OutputFormat) -> Self {
        Self {
            codec,
            capabilities,
            fallback,
        }
    }

    pub fn codec(&self) -> &C {
        self.codec
    }

    /// Pick the format that will actually be written for `requested`.
    pub fn resolve_format(
        &self,
        requested: OutputFormat,
    ) -> Result<(OutputFormat, Option<FormatSubstitution>), TranscodeError> {
        if self.capabilities.is_supported(self.codec, requested) {
            return Ok((requested, None));
        }
        if requested != self.fallback && self.capabilities.is_supported(self.codec, self.fallback)
        {
            log::warn!(
                "{} is not encodable in this build, substituting {}",
                requested,
                self.fallback
            );
            return Ok((
                self.fallback,
                Some(FormatSubstitution {
                    requested,
                    actual: self.fallback,
                }),
            ));
        }
        Err(TranscodeError::UnsupportedFormat {
            requested,
            fallback: self.fallback,
        })
    }

    /// Resolve the format and encode at `quality`.
    pub fn encode(
        &self,
        surface: &RgbaImage,
        requested: OutputFormat,
        quality: Quality,
    ) -> Result<EncodedResult, TranscodeError> {
        let (format, substitution) = self.resolve_format(requested)?;
        self.encode_as(surface, format, quality.as_unit(), substitution)
    }

    /// Encode as an already-resolved format at a codec-scale quality.
    pub fn encode_as(
        &self,
        surface: &RgbaImage,
        format: OutputFormat,
        quality: f64,
        substitution: Option<FormatSubstitution>,
    ) -> Result<EncodedResult, TranscodeError> {
        let bytes = self.codec.encode(surface, format, quality)?;
        if bytes.is_empty() {
            return Err(TranscodeError::EncodeFailure {
                format,
                reason: "encoder produced no bytes".into(),
            });
        }

        Ok(EncodedResult {
            byte_size: bytes.len() as u64,
            bytes,
            mime: format.mime(),
            format,
            quality: self
                .codec
                .honors_quality(format)
                .then(|| Quality::from_unit(quality)),
            substitution,
        })
    }
}
