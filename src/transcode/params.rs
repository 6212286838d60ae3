//! Parameter types for transcoding.
//!
//! These types describe *what* to produce, not *how*. They are the interface
//! between the controls collaborator (CLI flags, config files, a UI) and the
//! pipeline in [`operations`](super::operations).
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 82). Clamped on construction.
//! - [`OutputFormat`] — Target codec. All per-format knowledge lives in exhaustive matches here.
//! - [`FitMode`] / [`Anchor`] — How the source maps onto the target box.
//! - [`Color`] — Background fill, parsed from `#rgb`, `#rrggbb`, `#rrggbbaa` or a name.
//! - [`Filters`] — Brightness / contrast / saturation multipliers.
//! - [`RenderOptions`] — Everything above plus target size and byte budget.
//! - [`SourceImage`] — Undecoded input bytes with their declared size and mime type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a CLI or config string doesn't name a known option.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} '{value}': expected {expected}")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl ParseOptionError {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Linear mapping onto the codec scale: 1 → 0.01, 100 → 1.0.
    pub fn as_unit(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Inverse of [`as_unit`](Self::as_unit), rounding to the nearest step.
    pub fn from_unit(unit: f64) -> Self {
        if !unit.is_finite() {
            return Self(1);
        }
        Self::new((unit * 100.0).round().clamp(1.0, 100.0) as u32)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(82)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

/// Output codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    #[serde(rename = "webp")]
    WebP,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Png,
        OutputFormat::Jpeg,
        OutputFormat::WebP,
        OutputFormat::Avif,
    ];

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    /// Whether the container can store an alpha channel.
    pub fn supports_alpha(self) -> bool {
        match self {
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Avif => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Whether the format trades fidelity for size through a quality knob.
    pub fn is_lossy(self) -> bool {
        match self {
            OutputFormat::Png => false,
            OutputFormat::Jpeg | OutputFormat::WebP | OutputFormat::Avif => true,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(OutputFormat::Png),
            "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
            "image/webp" => Some(OutputFormat::WebP),
            "image/avif" => Some(OutputFormat::Avif),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "webp" => Some(OutputFormat::WebP),
            "avif" => Some(OutputFormat::Avif),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .or_else(|| Self::from_mime(s))
            .ok_or_else(|| ParseOptionError::new("format", s, "png, jpeg, webp or avif"))
    }
}

/// How the source aspect ratio is mapped onto the target box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Letterbox: whole source visible, no crop.
    #[default]
    Contain,
    /// Fill the box, cropping the overflow.
    Cover,
}

impl FromStr for FitMode {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contain" => Ok(FitMode::Contain),
            "cover" => Ok(FitMode::Cover),
            _ => Err(ParseOptionError::new("fit mode", s, "contain or cover")),
        }
    }
}

/// Which part of the source survives a `cover` crop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    Top,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Anchor {
    /// Position of the crop window along each axis: 0.0 = start, 0.5 = middle, 1.0 = end.
    pub fn bias(self) -> (f64, f64) {
        match self {
            Anchor::TopLeft => (0.0, 0.0),
            Anchor::Top => (0.5, 0.0),
            Anchor::TopRight => (1.0, 0.0),
            Anchor::Left => (0.0, 0.5),
            Anchor::Center => (0.5, 0.5),
            Anchor::Right => (1.0, 0.5),
            Anchor::BottomLeft => (0.0, 1.0),
            Anchor::Bottom => (0.5, 1.0),
            Anchor::BottomRight => (1.0, 1.0),
        }
    }
}

impl FromStr for Anchor {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let anchor = match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Anchor::TopLeft,
            "top" => Anchor::Top,
            "top-right" => Anchor::TopRight,
            "left" => Anchor::Left,
            "center" | "centre" => Anchor::Center,
            "right" => Anchor::Right,
            "bottom-left" => Anchor::BottomLeft,
            "bottom" => Anchor::Bottom,
            "bottom-right" => Anchor::BottomRight,
            _ => {
                return Err(ParseOptionError::new(
                    "anchor",
                    s,
                    "center, top, bottom, left, right or a corner like top-left",
                ));
            }
        };
        Ok(anchor)
    }
}

/// An RGBA fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

impl FromStr for Color {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseOptionError::new("color", s, "#rgb, #rrggbb, #rrggbbaa or a name");
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => return Ok(Color::WHITE),
            "black" => return Ok(Color::BLACK),
            "transparent" => return Ok(Color::TRANSPARENT),
            _ => {}
        }
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let short = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| v * 17)
                        .map_err(|_| invalid())
                };
                Ok(Color::rgb(short(0)?, short(1)?, short(2)?))
            }
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a: channel(6)?,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ParseOptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_string()
    }
}

/// Tonal adjustments applied to the source before compositing.
///
/// Each value is a multiplier where `1.0` leaves the image unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Filters {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Filters {
    pub fn is_identity(&self) -> bool {
        self.brightness == 1.0 && self.contrast == 1.0 && self.saturation == 1.0
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

/// Full description of one transcode request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Target width; derived from `height` and the source aspect when absent.
    pub width: Option<u32>,
    /// Target height; derived from `width` and the source aspect when absent.
    pub height: Option<u32>,
    pub fit: FitMode,
    pub anchor: Anchor,
    pub background: Option<Color>,
    pub filters: Option<Filters>,
    /// Byte budget for the encoded output. Lossy formats only.
    pub max_bytes: Option<u64>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: Quality::default(),
            width: None,
            height: None,
            fit: FitMode::default(),
            anchor: Anchor::default(),
            background: None,
            filters: None,
            max_bytes: None,
        }
    }
}

const OPTION_KEYS: &str = "format, quality, width, height, fit, anchor, background, \
brightness, contrast, saturation or max-bytes";

fn parse_number<T: FromStr>(kind: &'static str, value: &str) -> Result<T, ParseOptionError> {
    value
        .parse()
        .map_err(|_| ParseOptionError::new(kind, value, "a number"))
}

/// Parse an optional numeric value where `auto`/`none` clears it.
fn parse_optional<T: FromStr>(
    kind: &'static str,
    value: &str,
) -> Result<Option<T>, ParseOptionError> {
    match value {
        "auto" | "none" => Ok(None),
        _ => parse_number(kind, value).map(Some),
    }
}

impl RenderOptions {
    /// Apply one `key=value` edit, as pushed by a controls collaborator.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ParseOptionError> {
        let value = value.trim();
        match key.trim() {
            "format" => self.format = value.parse()?,
            "quality" => self.quality = Quality::new(parse_number("quality", value)?),
            "width" => self.width = parse_optional("width", value)?,
            "height" => self.height = parse_optional("height", value)?,
            "fit" => self.fit = value.parse()?,
            "anchor" => self.anchor = value.parse()?,
            "background" => {
                self.background = match value {
                    "none" => None,
                    _ => Some(value.parse()?),
                }
            }
            "brightness" => {
                self.filters.get_or_insert_with(Filters::default).brightness =
                    parse_number("brightness", value)?
            }
            "contrast" => {
                self.filters.get_or_insert_with(Filters::default).contrast =
                    parse_number("contrast", value)?
            }
            "saturation" => {
                self.filters.get_or_insert_with(Filters::default).saturation =
                    parse_number("saturation", value)?
            }
            "max-bytes" | "max_bytes" => self.max_bytes = parse_optional("max-bytes", value)?,
            other => return Err(ParseOptionError::new("option", other, OPTION_KEYS)),
        }
        Ok(())
    }

    /// Apply whitespace-separated `key=value` pairs in order.
    ///
    /// Stops at the first bad pair; earlier pairs stay applied.
    pub fn apply_overrides(&mut self, line: &str) -> Result<(), ParseOptionError> {
        for pair in line.split_whitespace() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ParseOptionError::new("setting", pair, "key=value"))?;
            self.apply_override(key, value)?;
        }
        Ok(())
    }
}

/// Undecoded input as handed over by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    /// Declared size of the original upload.
    pub byte_size: u64,
    /// Declared mime type, if the collaborator knew one.
    pub mime: Option<String>,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime: Option<String>) -> Self {
        Self {
            byte_size: bytes.len() as u64,
            bytes,
            mime,
        }
    }

    /// Read a file, taking the mime type from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime = image::ImageFormat::from_path(path)
            .ok()
            .map(|f| f.to_mime_type().to_string());
        Ok(Self::new(bytes, mime))
    }
}
