//! Runtime encoder capability detection.
//!
//! Whether a format can be encoded depends on what the codec was built with,
//! not on the format itself, so the only reliable test is to try. The first
//! query for a format encodes a 2×2 surface; the answer is cached for the rest
//! of the session because it cannot change while the process runs.
//!
//! # Lifecycle
//!
//! [`CapabilityCache::global`] is initialised on first access and lives for
//! the whole process. Each format is written at most once in practice;
//! concurrent first probes may both run, but they compute the same boolean,
//! so the second write is a no-op.

use super::codec::Codec;
use super::params::OutputFormat;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

static GLOBAL: LazyLock<Arc<CapabilityCache>> = LazyLock::new(|| Arc::new(CapabilityCache::new()));

/// Memoized `format → encodable` map.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: RwLock<HashMap<OutputFormat, bool>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> Arc<CapabilityCache> {
        Arc::clone(&GLOBAL)
    }

    /// Whether `codec` can encode `format`, probing on first use.
    pub fn is_supported(&self, codec: &impl Codec, format: OutputFormat) -> bool {
        if let Some(known) = self.cached(format) {
            return known;
        }

        let supported = probe(codec, format);
        log::debug!("capability probe: {format} supported={supported}");

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *entries.entry(format).or_insert(supported)
    }

    /// Cached answer without probing.
    pub fn cached(&self, format: OutputFormat) -> Option<bool> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&format)
            .copied()
    }

    /// Probe every format and return them in declaration order.
    pub fn table(&self, codec: &impl Codec) -> Vec<(OutputFormat, bool)> {
        OutputFormat::ALL
            .iter()
            .map(|&format| (format, self.is_supported(codec, format)))
            .collect()
    }
}

/// Encode a minimal surface; any non-empty output counts as support.
fn probe(codec: &impl Codec, format: OutputFormat) -> bool {
    let surface = RgbaImage::from_pixel(2, 2, Rgba([128, 128, 128, 255]));
    match codec.encode(&surface, format, 0.8) {
        Ok(bytes) => !bytes.is_empty(),
        Err(e) => {
            log::debug!("capability probe: {format} failed: {e}");
            false
        }
    }
}
