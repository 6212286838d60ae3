//! # pixfit
//!
//! Resize, crop, recolor and re-encode images to fit a box and a byte budget.
//!
//! # Architecture: One Pipeline, Three Drivers
//!
//! Every conversion runs through the same sequential pipeline:
//!
//! ```text
//! SourceImage → decode → geometry → background + filters → surface
//!             → encode (format fallback) → [byte-budget search] → EncodedResult
//! ```
//!
//! The pipeline is driven three ways: once per CLI `convert`, in parallel per
//! file for `batch`, and debounced per parameter change for `preview`.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`transcode`] | The pipeline: geometry, transparency check, capability cache, render, encode, size search |
//! | [`preview`] | Debounced live preview with generation-checked, last-initiated-wins results |
//! | [`batch`] | Directory walk + parallel conversion with streamed progress events |
//! | [`config`] | `pixfit.toml` loading, validation and merging over stock defaults |
//! | [`output`] | CLI output formatting: status lines, byte sizes, capability table |
//!
//! # Design Decisions
//!
//! ## Substitution Is Data, Not Just a Log Line
//!
//! When this build can't encode the requested format, the configured fallback
//! (JPEG by default) is written instead. The switch is logged at `warn`, and
//! it is also recorded in [`transcode::EncodedResult::substitution`] so a
//! caller can name the output file and tell the user without parsing logs.
//!
//! ## Capabilities Are Probed, Not Assumed
//!
//! Which formats can be encoded depends on how the `image` crate was built.
//! Each format is probed once with a tiny encode and the answer cached for
//! the process in [`transcode::CapabilityCache`].
//!
//! ## Best-Effort Byte Budgets
//!
//! `--max-bytes` runs a fixed-length binary search over quality. When no
//! quality fits, the lowest-quality result is returned and flagged as having
//! missed the budget rather than failing the conversion.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling (Lanczos3) and encoding all come from the `image`
//! crate and its pure-Rust codecs. There are no system libraries to install.

pub mod batch;
pub mod config;
pub mod output;
pub mod preview;
pub mod transcode;
