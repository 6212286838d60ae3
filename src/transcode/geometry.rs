//! Pure geometry for mapping a source image onto a target box.
//!
//! All functions here are pure and testable without any I/O or images.
//! Degenerate inputs (zero-sized boxes from a half-typed numeric field) are
//! clamped to 1 pixel before any division, so nothing here can fail or
//! produce NaN.

use super::params::{Anchor, FitMode};

/// An axis-aligned rectangle in pixel space.
///
/// Source crop windows may be fractional; destination rectangles are always
/// whole pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether `self` lies entirely inside a `width × height` box at the origin.
    pub fn within(&self, width: f64, height: f64) -> bool {
        const SLACK: f64 = 1e-9;
        self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= width + SLACK
            && self.y + self.height <= height + SLACK
    }
}

/// Resolved draw plan for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub target_width: u32,
    pub target_height: u32,
    pub fit: FitMode,
    pub anchor: Anchor,
    /// Region of the source that gets sampled.
    pub source_rect: Rect,
    /// Region of the target surface that receives the sampled pixels.
    pub dest_rect: Rect,
}

/// Work out the target box when the caller fixed at most one dimension.
///
/// - Both given → used as-is.
/// - One given → the other follows the source aspect ratio.
/// - Neither → the source dimensions.
///
/// # Examples
/// ```
/// # use pixfit::transcode::resolve_target_size;
/// assert_eq!(resolve_target_size((1000, 500), Some(400), None), (400, 200));
/// assert_eq!(resolve_target_size((1000, 500), None, None), (1000, 500));
/// ```
pub fn resolve_target_size(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    let aspect = src_w as f64 / src_h as f64;

    let (w, h) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, (w.max(1) as f64 / aspect).round() as u32),
        (None, Some(h)) => ((h.max(1) as f64 * aspect).round() as u32, h),
        (None, None) => (src_w, src_h),
    };
    (w.max(1), h.max(1))
}

/// Compute source and destination rectangles for a fit mode and anchor.
///
/// # Arguments
/// * `source` - Intrinsic source dimensions (width, height)
/// * `target` - Output box (width, height)
/// * `fit` - `Contain` letterboxes, `Cover` crops
/// * `anchor` - Crop bias under `Cover`; ignored by `Contain`, which always centers
///
/// # Examples
/// ```
/// # use pixfit::transcode::{resolve_geometry, FitMode, Anchor};
/// let g = resolve_geometry((1000, 500), (500, 500), FitMode::Contain, Anchor::Center);
/// assert_eq!((g.dest_rect.width, g.dest_rect.height), (500.0, 250.0));
/// assert_eq!(g.dest_rect.y, 125.0);
/// ```
pub fn resolve_geometry(
    source: (u32, u32),
    target: (u32, u32),
    fit: FitMode,
    anchor: Anchor,
) -> Geometry {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    let (tgt_w, tgt_h) = (target.0.max(1), target.1.max(1));

    let (source_rect, dest_rect) = match fit {
        FitMode::Contain => contain_rects((src_w, src_h), (tgt_w, tgt_h)),
        FitMode::Cover => cover_rects((src_w, src_h), (tgt_w, tgt_h), anchor),
    };

    Geometry {
        target_width: tgt_w,
        target_height: tgt_h,
        fit,
        anchor,
        source_rect,
        dest_rect,
    }
}

fn contain_rects(source: (u32, u32), target: (u32, u32)) -> (Rect, Rect) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    let (draw_w, draw_h) = if src_aspect > tgt_aspect {
        // Source is wider: width matches, letterbox top and bottom
        let h = (tgt_w as f64 / src_aspect).round() as u32;
        (tgt_w, h.clamp(1, tgt_h))
    } else {
        // Source is taller (or equal): height matches, pillarbox left and right
        let w = (tgt_h as f64 * src_aspect).round() as u32;
        (w.clamp(1, tgt_w), tgt_h)
    };

    let offset_x = (tgt_w - draw_w) / 2;
    let offset_y = (tgt_h - draw_h) / 2;

    (
        Rect::new(0.0, 0.0, src_w as f64, src_h as f64),
        Rect::new(
            offset_x as f64,
            offset_y as f64,
            draw_w as f64,
            draw_h as f64,
        ),
    )
}

fn cover_rects(source: (u32, u32), target: (u32, u32), anchor: Anchor) -> (Rect, Rect) {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    let (tgt_w, tgt_h) = (target.0 as f64, target.1 as f64);

    let scale = (tgt_w / src_w).max(tgt_h / src_h);
    let crop_w = (tgt_w / scale).min(src_w);
    let crop_h = (tgt_h / scale).min(src_h);

    let (bias_x, bias_y) = anchor.bias();
    let x = ((src_w - crop_w) * bias_x).clamp(0.0, src_w - crop_w);
    let y = ((src_h - crop_h) * bias_y).clamp(0.0, src_h - crop_h);

    (
        Rect::new(x, y, crop_w, crop_h),
        Rect::new(0.0, 0.0, tgt_w, tgt_h),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANCHORS: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::Top,
        Anchor::TopRight,
        Anchor::Left,
        Anchor::Center,
        Anchor::Right,
        Anchor::BottomLeft,
        Anchor::Bottom,
        Anchor::BottomRight,
    ];

    fn boxes() -> Vec<(u32, u32)> {
        let edges = [1, 2, 3, 7, 16, 99, 250, 500, 641, 1000, 1920, 4000];
        edges
            .iter()
            .flat_map(|&w| edges.iter().map(move |&h| (w, h)))
            .collect()
    }

    // =========================================================================
    // contain
    // =========================================================================

    #[test]
    fn contain_wide_source_into_square() {
        let g = resolve_geometry((1000, 500), (500, 500), FitMode::Contain, Anchor::Center);
        assert_eq!(g.dest_rect, Rect::new(0.0, 125.0, 500.0, 250.0));
        assert_eq!(g.source_rect, Rect::new(0.0, 0.0, 1000.0, 500.0));
    }

    #[test]
    fn contain_tall_source_is_pillarboxed() {
        let g = resolve_geometry((300, 600), (400, 400), FitMode::Contain, Anchor::Center);
        assert_eq!(g.dest_rect, Rect::new(100.0, 0.0, 200.0, 400.0));
    }

    #[test]
    fn contain_ignores_anchor() {
        let a = resolve_geometry((1000, 500), (500, 500), FitMode::Contain, Anchor::TopLeft);
        let b = resolve_geometry((1000, 500), (500, 500), FitMode::Contain, Anchor::Center);
        assert_eq!(a.dest_rect, b.dest_rect);
    }

    #[test]
    fn contain_preserves_aspect_and_stays_inside_box() {
        for source in boxes() {
            for target in boxes() {
                let g = resolve_geometry(source, target, FitMode::Contain, Anchor::Center);
                let d = g.dest_rect;
                assert!(
                    d.within(target.0 as f64, target.1 as f64),
                    "{source:?} → {target:?}: {d:?}"
                );
                assert!(d.width >= 1.0 && d.height >= 1.0);

                let (sw, sh) = (source.0 as f64, source.1 as f64);
                let height_err = (d.width * sh / sw - d.height).abs();
                let width_err = (d.height * sw / sh - d.width).abs();
                assert!(
                    height_err <= 1.0 || width_err <= 1.0,
                    "{source:?} → {target:?}: aspect drift {d:?}"
                );

                // Centered: the leftover space splits within one pixel
                let left = d.x;
                let right = target.0 as f64 - d.x - d.width;
                let top = d.y;
                let bottom = target.1 as f64 - d.y - d.height;
                assert!((left - right).abs() <= 1.0 && (top - bottom).abs() <= 1.0);
            }
        }
    }

    // =========================================================================
    // cover
    // =========================================================================

    #[test]
    fn cover_wide_source_into_square_center() {
        let g = resolve_geometry((1000, 500), (500, 500), FitMode::Cover, Anchor::Center);
        assert_eq!(g.dest_rect, Rect::new(0.0, 0.0, 500.0, 500.0));
        assert_eq!(g.source_rect, Rect::new(250.0, 0.0, 500.0, 500.0));
    }

    #[test]
    fn cover_edge_anchors_bias_crop() {
        let left = resolve_geometry((1000, 500), (500, 500), FitMode::Cover, Anchor::Left);
        assert_eq!(left.source_rect.x, 0.0);
        let right = resolve_geometry((1000, 500), (500, 500), FitMode::Cover, Anchor::BottomRight);
        assert_eq!(right.source_rect.x, 500.0);
        assert_eq!(right.source_rect.y, 0.0);

        let top = resolve_geometry((400, 800), (400, 400), FitMode::Cover, Anchor::Top);
        assert_eq!(top.source_rect, Rect::new(0.0, 0.0, 400.0, 400.0));
        let bottom = resolve_geometry((400, 800), (400, 400), FitMode::Cover, Anchor::Bottom);
        assert_eq!(bottom.source_rect, Rect::new(0.0, 400.0, 400.0, 400.0));
    }

    #[test]
    fn cover_fills_box_and_crops_inside_source() {
        for source in boxes() {
            for target in boxes() {
                for anchor in ANCHORS {
                    let g = resolve_geometry(source, target, FitMode::Cover, anchor);
                    assert_eq!(
                        g.dest_rect,
                        Rect::new(0.0, 0.0, target.0 as f64, target.1 as f64)
                    );
                    assert!(
                        g.source_rect.within(source.0 as f64, source.1 as f64),
                        "{source:?} → {target:?} {anchor:?}: {:?}",
                        g.source_rect
                    );
                }
            }
        }
    }

    // =========================================================================
    // clamping
    // =========================================================================

    #[test]
    fn zero_target_is_clamped_to_one_pixel() {
        for fit in [FitMode::Contain, FitMode::Cover] {
            let g = resolve_geometry((800, 600), (0, 0), fit, Anchor::Center);
            assert_eq!((g.target_width, g.target_height), (1, 1));
            assert!(g.dest_rect.width.is_finite() && g.dest_rect.height.is_finite());
            assert!(g.source_rect.x.is_finite() && g.source_rect.width > 0.0);
        }
    }

    #[test]
    fn zero_source_is_clamped_to_one_pixel() {
        let g = resolve_geometry((0, 0), (10, 10), FitMode::Cover, Anchor::Center);
        assert_eq!(g.source_rect, Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    // =========================================================================
    // resolve_target_size
    // =========================================================================

    #[test]
    fn target_size_derives_missing_height() {
        assert_eq!(resolve_target_size((1000, 500), Some(400), None), (400, 200));
    }

    #[test]
    fn target_size_derives_missing_width() {
        assert_eq!(resolve_target_size((1000, 500), None, Some(100)), (200, 100));
    }

    #[test]
    fn target_size_defaults_to_source() {
        assert_eq!(resolve_target_size((640, 480), None, None), (640, 480));
    }

    #[test]
    fn target_size_clamps_zero() {
        assert_eq!(resolve_target_size((640, 480), Some(0), Some(0)), (1, 1));
        assert_eq!(resolve_target_size((4000, 10), Some(10), None), (10, 1));
    }
}
