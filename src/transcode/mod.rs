//! Image transcoding — decode, fit, composite, encode, fit a byte budget.
//!
//! | Step | Module |
//! |---|---|
//! | **Geometry** (contain / cover, 9 anchors) | [`geometry`] |
//! | **Transparency check** (bounded downsample) | [`alpha`] |
//! | **Encoder capability** (probe once, cache) | [`capability`] |
//! | **Render** (decode, background, filters, blit) | [`render`] |
//! | **Encode** (quality mapping, format fallback) | [`encoder`] |
//! | **Byte budget** (binary search over quality) | [`search`] |
//!
//! The module is split into:
//! - **Calculations**: Pure geometry (unit testable)
//! - **Parameters**: Data structures describing a request
//! - **Codec**: [`Codec`] trait + [`RustCodec`]
//! - **Operations**: [`Transcoder`], which ties the steps together

pub mod alpha;
pub mod capability;
pub mod codec;
pub mod encoder;
mod geometry;
pub mod operations;
mod params;
pub mod render;
pub mod rust_codec;
pub mod search;

pub use alpha::AlphaProbe;
pub use capability::CapabilityCache;
pub use codec::{Codec, TranscodeError};
pub use encoder::{EncodedResult, Encoder, FormatSubstitution};
pub use geometry::{Geometry, Rect, resolve_geometry, resolve_target_size};
pub use operations::{SearchSummary, TranscodeSettings, Transcoded, Transcoder};
pub use params::{
    Anchor, Color, Filters, FitMode, OutputFormat, ParseOptionError, Quality, RenderOptions,
    SourceImage,
};
pub use rust_codec::{RustCodec, supported_input_extensions};
pub use search::{SearchOutcome, SizeSearch};
