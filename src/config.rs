//! Configuration module.
//!
//! Handles loading, validating, and merging `pixfit.toml`. Stock defaults are
//! overridden by the user file, and CLI flags override both.
//!
//! ## Config File Location
//!
//! `pixfit` looks for `pixfit.toml` in the working directory unless
//! `--config <file>` is given.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! format = "jpeg"           # png | jpeg | webp | avif
//! quality = 82              # 1-100
//! fit = "contain"           # contain | cover
//! anchor = "center"         # center, top, bottom-right, ...
//! # background = "#ffffff"  # Fill behind transparent pixels (optional)
//! fallback_format = "jpeg"  # Written when `format` can't be encoded
//! avif_speed = 6            # rav1e speed, 1 (slow) - 10 (fast)
//!
//! [search]
//! min_quality = 0.05        # Lowest quality the byte-budget search tries
//! iterations = 8            # Probe budget
//!
//! [alpha]
//! max_dimension = 256       # Longest side scanned by the transparency check
//!
//! [preview]
//! debounce_ms = 350         # Quiet period before a preview renders
//!
//! [processing]
//! max_processes = 4         # Max parallel batch workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [output]
//! format = "avif"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::transcode::{
    AlphaProbe, Anchor, Color, FitMode, OutputFormat, Quality, RenderOptions, SizeSearch,
    TranscodeSettings,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "pixfit.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `pixfit.toml`.
///
/// All fields have defaults; user files specify only what they override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PixfitConfig {
    /// Output defaults (format, quality, fit).
    pub output: OutputConfig,
    /// Byte-budget search bounds.
    pub search: SearchConfig,
    /// Transparency check bounds.
    pub alpha: AlphaConfig,
    /// Live preview timing.
    pub preview: PreviewConfig,
    /// Parallel batch settings.
    pub processing: ProcessingConfig,
}

impl PixfitConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if !(1..=10).contains(&self.output.avif_speed) {
            return Err(ConfigError::Validation(
                "output.avif_speed must be 1-10".into(),
            ));
        }
        if !(self.search.min_quality > 0.0 && self.search.min_quality <= 1.0) {
            return Err(ConfigError::Validation(
                "search.min_quality must be in (0, 1]".into(),
            ));
        }
        if !(1..=32).contains(&self.search.iterations) {
            return Err(ConfigError::Validation(
                "search.iterations must be 1-32".into(),
            ));
        }
        if self.alpha.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "alpha.max_dimension must be non-zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Pipeline policy derived from this config.
    pub fn transcode_settings(&self) -> TranscodeSettings {
        TranscodeSettings {
            fallback_format: self.output.fallback_format,
            default_background: self.output.background.unwrap_or(Color::WHITE),
            alpha: AlphaProbe::new(self.alpha.max_dimension),
            search: SizeSearch {
                min_quality: self.search.min_quality,
                max_quality: 1.0,
                iterations: self.search.iterations,
            },
        }
    }

    /// Baseline request before CLI flags are applied.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            format: self.output.format,
            quality: Quality::new(self.output.quality),
            fit: self.output.fit,
            anchor: self.output.anchor,
            background: self.output.background,
            ..RenderOptions::default()
        }
    }
}

/// Output defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Encoding quality (1 = worst, 100 = best). Ignored by lossless formats.
    pub quality: u32,
    pub fit: FitMode,
    pub anchor: Anchor,
    /// Fill behind transparent pixels. When absent, white is used only if
    /// the output format can't store alpha.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Color>,
    pub fallback_format: OutputFormat,
    pub avif_speed: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: Quality::default().value(),
            fit: FitMode::Contain,
            anchor: Anchor::Center,
            background: None,
            fallback_format: OutputFormat::Jpeg,
            avif_speed: crate::transcode::rust_codec::DEFAULT_AVIF_SPEED,
        }
    }
}

/// Byte-budget search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub min_quality: f64,
    pub iterations: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let search = SizeSearch::default();
        Self {
            min_quality: search.min_quality,
            iterations: search.iterations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlphaConfig {
    pub max_dimension: u32,
}

impl Default for AlphaConfig {
    fn default() -> Self {
        Self {
            max_dimension: AlphaProbe::default().max_dimension,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    pub debounce_ms: u64,
}

impl PreviewConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { debounce_ms: 350 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel batch workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PixfitConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<PixfitConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PixfitConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load an explicit config file. A missing file is an error.
pub fn load_config_file(path: &Path) -> Result<PixfitConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    resolve_config(Some(value))
}

/// Load `pixfit.toml` from `dir`, or the stock defaults if there is none.
pub fn load_config(dir: &Path) -> Result<PixfitConfig, ConfigError> {
    let path = dir.join(CONFIG_FILENAME);
    if !path.exists() {
        return resolve_config(None);
    }
    load_config_file(&path)
}

/// Returns a fully-commented stock `pixfit.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixfit configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Command-line flags override them.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output defaults
# ---------------------------------------------------------------------------
[output]
# Output format: png, jpeg, webp or avif.
format = "jpeg"

# Encoding quality (1 = worst, 100 = best). Ignored by lossless formats.
quality = 82

# contain = letterbox inside the box, cover = fill the box and crop.
fit = "contain"

# Which part of the image survives a cover crop:
# center, top, bottom, left, right, top-left, top-right, bottom-left, bottom-right.
anchor = "center"

# Fill behind transparent pixels. When unset, white is used only for
# formats that can't store transparency (JPEG).
# background = "#ffffff"

# Written instead of `format` when this build can't encode it.
fallback_format = "jpeg"

# AVIF encoder speed, 1 (slowest, smallest) to 10 (fastest).
avif_speed = 6

# ---------------------------------------------------------------------------
# Byte-budget search (--max-bytes)
# ---------------------------------------------------------------------------
[search]
# Lowest quality tried, on the 0-1 codec scale.
min_quality = 0.05

# Number of encode probes before settling on the best result.
iterations = 8

# ---------------------------------------------------------------------------
# Transparency check
# ---------------------------------------------------------------------------
[alpha]
# Images are downsampled to this longest side before scanning for alpha.
max_dimension = 256

# ---------------------------------------------------------------------------
# Live preview
# ---------------------------------------------------------------------------
[preview]
# Milliseconds without a parameter change before a preview renders.
debounce_ms = 350

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel batch workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
