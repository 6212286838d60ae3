//! Batch conversion of a directory tree.
//!
//! Every decodable image under the input root is transcoded with the same
//! [`RenderOptions`] and written to the output root, keeping its relative
//! directory. Files are processed in parallel with
//! [rayon](https://docs.rs/rayon); each file's own pipeline (render, encode,
//! size search) stays sequential.
//!
//! A failing file doesn't stop the batch. Progress is streamed as
//! [`BatchEvent`]s over an optional `mpsc` channel so the CLI can print from
//! a separate thread while workers run.

use crate::transcode::{
    Codec, RenderOptions, SourceImage, TranscodeError, Transcoded, Transcoder,
    supported_input_extensions,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Progress report for one batch run.
#[derive(Debug)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    Converted {
        source: PathBuf,
        output: PathBuf,
        transcoded: Transcoded,
    },
    Failed {
        source: PathBuf,
        error: TranscodeError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub converted: usize,
    pub failed: usize,
    /// Files whose byte budget could not be met.
    pub over_budget: usize,
}

/// Decodable images under `root`, sorted by path.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::NotADirectory(root.to_path_buf()));
    }

    let extensions = supported_input_extensions();
    let mut images = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()));
        if matches {
            images.push(entry.into_path());
        }
    }
    images.sort();
    Ok(images)
}

/// Transcode every image under `input` into `output`.
pub fn convert_dir<C: Codec>(
    transcoder: &Transcoder<C>,
    input: &Path,
    output: &Path,
    options: &RenderOptions,
    events: Option<Sender<BatchEvent>>,
) -> Result<BatchSummary, BatchError> {
    let images = discover_images(input)?;
    std::fs::create_dir_all(output)?;
    log::info!("batch: {} images under {}", images.len(), input.display());
    let started = BatchEvent::Started {
        total: images.len(),
    };
    emit(&events, started);

    let stems = output_stems(input, &images);
    let outcomes: Vec<(bool, bool)> = images
        .par_iter()
        .zip(stems.par_iter())
        .map(|(source, stem)| {
            match convert_file(transcoder, input, output, source, stem, options) {
                Ok((written, transcoded)) => {
                    let met = transcoded.search.is_none_or(|s| s.met_target);
                    let event = BatchEvent::Converted {
                        source: source.clone(),
                        output: written,
                        transcoded,
                    };
                    emit(&events, event);
                    (true, met)
                }
                Err(error) => {
                    log::warn!("batch: {} failed: {error}", source.display());
                    let event = BatchEvent::Failed {
                        source: source.clone(),
                        error,
                    };
                    emit(&events, event);
                    (false, true)
                }
            }
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (ok, met) in outcomes {
        if ok {
            summary.converted += 1;
        } else {
            summary.failed += 1;
        }
        if !met {
            summary.over_budget += 1;
        }
    }
    Ok(summary)
}

fn emit(events: &Option<Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Output file stem for each image, in order.
///
/// Sources sharing a directory and stem (`photo.png`, `photo.jpg`) keep
/// their own extension in the name (`photo.png.jpg`, `photo.jpg.jpg`), so no
/// two outputs are written to the same path. Compared case-insensitively.
fn output_stems(root: &Path, images: &[PathBuf]) -> Vec<String> {
    let key = |path: &Path| {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative.with_extension("").to_string_lossy().to_lowercase()
    };
    let mut counts: HashMap<String, usize> = HashMap::new();
    for image in images {
        *counts.entry(key(image)).or_default() += 1;
    }

    images
        .iter()
        .map(|image| {
            let shared = counts.get(&key(image)).is_some_and(|&n| n > 1);
            let name = if shared {
                image.file_name()
            } else {
                image.file_stem()
            };
            name.map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string())
        })
        .collect()
}

/// Convert one file, returning where the result was written.
///
/// The extension comes from the format actually written, so a substituted
/// format gets a matching file name.
fn convert_file<C: Codec>(
    transcoder: &Transcoder<C>,
    input_root: &Path,
    output_root: &Path,
    source_path: &Path,
    stem: &str,
    options: &RenderOptions,
) -> Result<(PathBuf, Transcoded), TranscodeError> {
    let source = SourceImage::from_path(source_path)?;
    let transcoded = transcoder.transcode(&source, options)?;

    let relative = source_path.strip_prefix(input_root).unwrap_or(source_path);
    let dir = match relative.parent() {
        Some(parent) => output_root.join(parent),
        None => output_root.to_path_buf(),
    };
    std::fs::create_dir_all(&dir)?;

    let written = dir.join(transcoded.result.file_name(stem));
    std::fs::write(&written, &transcoded.result.bytes)?;
    Ok((written, transcoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::codec::tests::MockCodec;
    use crate::transcode::{CapabilityCache, OutputFormat};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::fs;
    use std::sync::{Arc, mpsc};
    use tempfile::TempDir;

    fn transcoder(codec: MockCodec) -> Transcoder<MockCodec> {
        Transcoder::new(codec).with_capabilities(Arc::new(CapabilityCache::new()))
    }

    fn opaque() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 255])))
    }

    fn setup_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        fs::create_dir_all(input.join("nested/deeper")).unwrap();
        fs::write(input.join("a.png"), b"png").unwrap();
        fs::write(input.join("B.JPG"), b"jpg").unwrap();
        fs::write(input.join("nested/deeper/c.webp"), b"webp").unwrap();
        fs::write(input.join("notes.txt"), b"not an image").unwrap();
        fs::write(input.join("nested/animation.gif"), b"gif").unwrap();
        tmp
    }

    #[test]
    fn discover_filters_by_extension() {
        let tmp = setup_tree();
        let input = tmp.path().join("in");
        let found: Vec<PathBuf> = discover_images(&input)
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(&input).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![
                PathBuf::from("B.JPG"),
                PathBuf::from("a.png"),
                PathBuf::from("nested/deeper/c.webp"),
            ]
        );
    }

    #[test]
    fn discover_rejects_files() {
        let tmp = setup_tree();
        let result = discover_images(&tmp.path().join("in/a.png"));
        assert!(matches!(result, Err(BatchError::NotADirectory(_))));
    }

    #[test]
    fn convert_dir_mirrors_tree() {
        let tmp = setup_tree();
        let out = tmp.path().join("out");
        let options = RenderOptions {
            format: OutputFormat::Jpeg,
            width: Some(4),
            ..RenderOptions::default()
        };

        let summary = convert_dir(
            &transcoder(MockCodec::with_source(opaque())),
            &tmp.path().join("in"),
            &out,
            &options,
            None,
        )
        .unwrap();

        assert_eq!(
            summary,
            BatchSummary {
                converted: 3,
                failed: 0,
                over_budget: 0
            }
        );
        assert!(out.join("a.jpg").exists());
        assert!(out.join("B.jpg").exists());
        assert!(out.join("nested/deeper/c.jpg").exists());
        assert!(!out.join("notes.jpg").exists());
    }

    #[test]
    fn failures_are_counted_and_reported() {
        let tmp = setup_tree();
        let (tx, rx) = mpsc::channel();

        // No mock source: every decode fails
        let summary = convert_dir(
            &transcoder(MockCodec::new()),
            &tmp.path().join("in"),
            &tmp.path().join("out"),
            &RenderOptions::default(),
            Some(tx),
        )
        .unwrap();
        assert_eq!(summary.converted, 0);
        assert_eq!(summary.failed, 3);

        let events: Vec<BatchEvent> = rx.iter().collect();
        assert!(matches!(events[0], BatchEvent::Started { total: 3 }));
        let failed = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    BatchEvent::Failed {
                        error: TranscodeError::Decode(_),
                        ..
                    }
                )
            })
            .count();
        assert_eq!(failed, 3);
    }

    #[test]
    fn substituted_format_names_output_file() {
        let tmp = setup_tree();
        let out = tmp.path().join("out");
        let codec = MockCodec::with_source(opaque()).without(&[OutputFormat::Avif]);
        let options = RenderOptions {
            format: OutputFormat::Avif,
            ..RenderOptions::default()
        };

        convert_dir(&transcoder(codec), &tmp.path().join("in"), &out, &options, None).unwrap();
        assert!(out.join("a.jpg").exists());
        assert!(!out.join("a.avif").exists());
    }

    #[test]
    fn same_stem_sources_get_distinct_outputs() {
        let tmp = setup_tree();
        let input = tmp.path().join("in");
        fs::write(input.join("photo.png"), b"png").unwrap();
        fs::write(input.join("photo.jpg"), b"jpg").unwrap();
        let out = tmp.path().join("out");
        let (tx, rx) = mpsc::channel();
        let options = RenderOptions {
            format: OutputFormat::Jpeg,
            ..RenderOptions::default()
        };

        let summary = convert_dir(
            &transcoder(MockCodec::with_source(opaque())),
            &input,
            &out,
            &options,
            Some(tx),
        )
        .unwrap();

        assert_eq!(summary.converted, 5);
        assert!(out.join("photo.png.jpg").exists());
        assert!(out.join("photo.jpg.jpg").exists());
        assert!(!out.join("photo.jpg").exists());
        // Unrelated files keep the plain stem
        assert!(out.join("a.jpg").exists());

        let mut outputs: Vec<PathBuf> = rx
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Converted { output, .. } => Some(output),
                _ => None,
            })
            .collect();
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), 5);
    }

    #[test]
    fn unmet_budget_is_counted() {
        let tmp = setup_tree();
        let options = RenderOptions {
            max_bytes: Some(1),
            ..RenderOptions::default()
        };
        let summary = convert_dir(
            &transcoder(MockCodec::with_source(opaque())),
            &tmp.path().join("in"),
            &tmp.path().join("out"),
            &options,
            None,
        )
        .unwrap();
        assert_eq!(summary.converted, 3);
        assert_eq!(summary.over_budget, 3);
    }
}
