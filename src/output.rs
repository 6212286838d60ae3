//! CLI output formatting.
//!
//! Every result is reported as one status line that leads with the outcome,
//! with details shown as indented context lines:
//!
//! ```text
//! Done → photo.jpg (123 KB)
//!     Size: 500×250
//!     Budget: 150 KB met after 8 probes
//! Done → logo.jpg (14 KB) [avif unavailable, wrote jpeg]
//! Error: Failed to decode source: unexpected end of file
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `String` or `Vec<String>`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::{BatchEvent, BatchSummary};
use crate::preview::PreviewEvent;
use crate::transcode::{EncodedResult, OutputFormat, SearchSummary, TranscodeError, Transcoded};
use std::path::Path;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Human-readable byte count: `512 B`, `123 KB`, `4.2 MB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{} KB", (bytes as f64 / KIB as f64).round() as u64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `Done → name.ext (123 KB)`, noting a format substitution if one happened.
pub fn done_line(file_name: &str, result: &EncodedResult) -> String {
    let mut line = format!(
        "Done \u{2192} {} ({})",
        file_name,
        format_bytes(result.byte_size)
    );
    if let Some(sub) = result.substitution {
        line.push_str(&format!(" [{} unavailable, wrote {}]", sub.requested, sub.actual));
    }
    line
}

pub fn error_line(error: &TranscodeError) -> String {
    format!("Error: {error}")
}

/// One status line for a transcode of `stem`.
pub fn status_line(stem: &str, result: &Result<EncodedResult, TranscodeError>) -> String {
    match result {
        Ok(encoded) => done_line(&encoded.file_name(stem), encoded),
        Err(e) => error_line(e),
    }
}

fn search_line(search: &SearchSummary, result: &EncodedResult) -> String {
    if search.met_target {
        format!(
            "Budget: {} met after {} probes",
            format_bytes(search.target),
            search.probes
        )
    } else {
        format!(
            "Budget: {} not reachable, smallest is {}",
            format_bytes(search.target),
            format_bytes(result.byte_size)
        )
    }
}

/// Status line plus size, quality and budget context.
pub fn format_transcoded(file_name: &str, transcoded: &Transcoded) -> Vec<String> {
    let result = &transcoded.result;
    let mut lines = vec![done_line(file_name, result)];
    lines.push(format!(
        "    Size: {}\u{00d7}{}",
        transcoded.geometry.target_width, transcoded.geometry.target_height
    ));
    if let Some(quality) = result.quality {
        lines.push(format!("    Quality: {}", quality.value()));
    }
    if let Some(search) = &transcoded.search {
        lines.push(format!("    {}", search_line(search, result)));
    }
    lines
}

pub fn print_transcoded(file_name: &str, transcoded: &Transcoded) {
    for line in format_transcoded(file_name, transcoded) {
        println!("{}", line);
    }
}

/// Which output formats this build can encode.
pub fn format_capability_table(table: &[(OutputFormat, bool)]) -> Vec<String> {
    let mut lines = vec!["Encoders".to_string()];
    for (format, supported) in table {
        let status = if *supported { "available" } else { "unavailable" };
        lines.push(format!("    {:<5} {:<11} {}", format.to_string(), status, format.mime()));
    }
    lines
}

pub fn print_capability_table(table: &[(OutputFormat, bool)]) {
    for line in format_capability_table(table) {
        println!("{}", line);
    }
}

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total } => vec![format!("Converting {} images", total)],
        BatchEvent::Converted {
            source,
            output,
            transcoded,
        } => {
            let mut lines = vec![done_line(&display_name(output), &transcoded.result)];
            lines.push(format!("    Source: {}", source.display()));
            if let Some(search) = &transcoded.search {
                lines.push(format!("    {}", search_line(search, &transcoded.result)));
            }
            lines
        }
        BatchEvent::Failed { source, error } => vec![
            error_line(error),
            format!("    Source: {}", source.display()),
        ],
    }
}

pub fn format_batch_summary(summary: &BatchSummary) -> String {
    let mut line = format!(
        "Converted {}, failed {}",
        summary.converted, summary.failed
    );
    if summary.over_budget > 0 {
        line.push_str(&format!(", {} over budget", summary.over_budget));
    }
    line
}

/// Preview progress for the log panel. Intermediate states print nothing.
pub fn format_preview_event(stem: &str, event: &PreviewEvent) -> Option<String> {
    match event {
        PreviewEvent::Displayed { generation, result } => {
            Some(format!("#{generation} {}", done_line(&result.file_name(stem), result)))
        }
        PreviewEvent::Failed { generation, error } => {
            Some(format!("#{generation} {}", error_line(error)))
        }
        PreviewEvent::Rendering { .. } | PreviewEvent::Discarded { .. } => None,
    }
}
