//! Constrained-size search: find the highest quality whose output fits a
//! byte budget.
//!
//! Binary search over the codec-scale quality `q ∈ [min_quality, max_quality]`
//! with a fixed probe budget:
//!
//! ```text
//! lo = min, hi = max, q = clamp(requested, lo, hi)
//! repeat `iterations` times:
//!     encode at q
//!     fits  → best = result, lo = q, q = (q + hi) / 2   (try for more fidelity)
//!     over  → hi = q, q = (q + lo) / 2
//!     error → treated as "over"
//! ```
//!
//! If nothing fit within the budget, one last probe is made at `lo` (the
//! floor), so a budget that only the lowest quality can meet is still found.
//! Convergence is best-effort: the outcome reports whether the target was met.
//!
//! Probes are strictly sequential, each depending on the previous bounds.

use super::codec::TranscodeError;
use super::encoder::EncodedResult;

pub const DEFAULT_MIN_QUALITY: f64 = 0.05;
pub const DEFAULT_ITERATIONS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeSearch {
    pub min_quality: f64,
    pub max_quality: f64,
    pub iterations: u32,
}

impl Default for SizeSearch {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_MIN_QUALITY,
            max_quality: 1.0,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub result: EncodedResult,
    /// Encodes performed, including the floor probe.
    pub probes: u32,
    pub met_target: bool,
}

impl SizeSearch {
    /// Search for the best encode of at most `target` bytes.
    ///
    /// `encode_at` is called with codec-scale qualities. Returns the last
    /// encode error only if every probe failed.
    pub fn run<F>(
        &self,
        requested: f64,
        target: u64,
        mut encode_at: F,
    ) -> Result<SearchOutcome, TranscodeError>
    where
        F: FnMut(f64) -> Result<EncodedResult, TranscodeError>,
    {
        let mut lo = self.min_quality;
        let mut hi = self.max_quality.max(lo);
        let mut q = if requested.is_finite() {
            requested.clamp(lo, hi)
        } else {
            hi
        };

        let mut best: Option<EncodedResult> = None;
        let mut lowest: Option<(f64, EncodedResult)> = None;
        let mut last_error = None;
        let mut probes = 0;

        for _ in 0..self.iterations.max(1) {
            probes += 1;
            match encode_at(q) {
                Ok(result) if result.byte_size <= target => {
                    log::debug!("size search: q={q:.4} → {} B fits {target} B", result.byte_size);
                    best = Some(result);
                    lo = q;
                    q = (q + hi) / 2.0;
                }
                Ok(result) => {
                    log::debug!("size search: q={q:.4} → {} B over {target} B", result.byte_size);
                    if lowest.as_ref().is_none_or(|(lq, _)| q < *lq) {
                        lowest = Some((q, result));
                    }
                    hi = q;
                    q = (q + lo) / 2.0;
                }
                Err(e) => {
                    log::debug!("size search: q={q:.4} failed: {e}");
                    last_error = Some(e);
                    hi = q;
                    q = (q + lo) / 2.0;
                }
            }
        }

        if let Some(result) = best {
            return Ok(SearchOutcome {
                result,
                probes,
                met_target: true,
            });
        }

        // Nothing fit: `lo` never moved, so this is the floor
        probes += 1;
        match encode_at(lo) {
            Ok(result) => {
                let met_target = result.byte_size <= target;
                log::debug!("size search: floor q={lo:.4} → {} B", result.byte_size);
                Ok(SearchOutcome {
                    result,
                    probes,
                    met_target,
                })
            }
            Err(e) => match lowest {
                Some((_, result)) => Ok(SearchOutcome {
                    result,
                    probes,
                    met_target: false,
                }),
                None => Err(last_error.unwrap_or(e)),
            },
        }
    }
}
