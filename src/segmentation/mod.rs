mod hsv;
mod mask;
mod overlay;
pub mod types;

pub use hsv::{rgb_to_hsv, rgba_to_rgb, to_hsv, HsvImage};
pub use mask::Mask;
pub use overlay::{draw_label, draw_roi, draw_roi_rgba, LABEL_COLOR, ROI_COLOR};
pub use types::{AreaReport, MatchStats, Segmentation};

use crate::config::HsvRange;
use crate::error::{Error, Result};
use crate::geometry::{compute_rect, RectSpec};
use image::{Rgb, RgbImage, RgbaImage};
use std::time::Instant;

/// Weight of the mask layer when blended over the frame
pub const MASK_WEIGHT: f32 = 0.7;

/// Label anchor, measured from the bottom-right corner (x, baseline)
const LABEL_INSET: (i32, i32) = (200, 20);

/// Run the HSV filter over `frame`.
///
/// Steps:
/// 1. Drop alpha and convert to 8-bit HSV
/// 2. Threshold against the inclusive bounds, inverting if requested
/// 3. Blend the mask (as white) over the frame at [`MASK_WEIGHT`]
/// 4. With a rectangle: outline the clipped ROI, count mask pixels inside it
///    and print the percentage near the bottom-right corner
///
/// Pure: identical inputs give identical stats and pixel-identical output.
pub fn segment(
    frame: &RgbaImage,
    range: &HsvRange,
    rect: Option<RectSpec>,
) -> Result<Segmentation> {
    let _span = tracing::debug_span!("segment").entered();
    let started = Instant::now();

    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyFrame);
    }

    let color = rgba_to_rgb(frame);

    let mask = {
        let _span = tracing::debug_span!("threshold").entered();
        let hsv = to_hsv(&color);
        let mut mask = Mask::threshold(&hsv, range);
        if range.invert {
            mask.invert();
        }
        mask
    };

    let mut blended = blend_mask(&color, &mask);

    let report = match rect {
        None => AreaReport::NotRequested,
        Some(spec) => {
            let roi = compute_rect(width, height, spec);
            match mask.count_in(&roi) {
                Some(matching) => {
                    draw_roi(&mut blended, &roi, ROI_COLOR);
                    let stats = MatchStats::new(roi, matching);
                    tracing::debug!(
                        "ROI area {} px, matching {} px, {:.1}%",
                        stats.total_area_px,
                        stats.matching_px,
                        stats.percentage
                    );
                    AreaReport::Measured(stats)
                }
                None => {
                    tracing::warn!("ROI {:?} is degenerate, percentage not measured", roi);
                    AreaReport::InvalidRect(roi)
                }
            }
        }
    };

    let mut annotated = hsv::rgb_to_rgba(&blended);
    if rect.is_some() {
        let x = width as i32 - LABEL_INSET.0;
        let y = height as i32 - LABEL_INSET.1 - overlay::label_height() as i32;
        draw_label(&mut annotated, x, y, &report.label(), LABEL_COLOR);
    }

    tracing::debug!(
        "segmented {}x{} in {:.1}ms, {} px matched",
        width,
        height,
        started.elapsed().as_secs_f64() * 1000.0,
        mask.count_set()
    );

    Ok(Segmentation {
        annotated,
        mask,
        report,
        range: *range,
        rect,
    })
}

/// `out = color * 1.0 + mask * MASK_WEIGHT`, saturating at 255
fn blend_mask(color: &RgbImage, mask: &Mask) -> RgbImage {
    RgbImage::from_fn(color.width(), color.height(), |x, y| {
        let layer = if mask.is_set(x, y) { mask::SET as f32 } else { 0.0 };
        let add = layer * MASK_WEIGHT;
        let p = color.get_pixel(x, y);
        Rgb(p.0.map(|c| (c as f32 + add).round_ties_even().min(255.0) as u8))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 200, 0, 255]);

    fn half_red(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { GREEN })
    }

    #[test]
    fn test_empty_frame_fails() {
        let result = segment(&RgbaImage::new(0, 10), &HsvRange::default(), None);
        assert!(matches!(result, Err(Error::EmptyFrame)));
    }

    #[test]
    fn test_full_red_frame_matches_everywhere() {
        let frame = RgbaImage::from_pixel(100, 100, RED);
        let result = segment(&frame, &HsvRange::default(), Some(RectSpec::new(50, 50))).unwrap();
        let stats = result.report.stats().copied().unwrap();
        assert_eq!(stats.total_area_px, 2500);
        assert_eq!(stats.matching_px, 2500);
        assert_eq!(stats.percentage, 100.0);
        assert_eq!(result.report.label(), "Area: 100.0%");
        assert_eq!(result.rect, Some(RectSpec::new(50, 50)));
        assert_eq!(result.range, HsvRange::default());
    }

    #[test]
    fn test_no_rect_reports_unavailable_and_draws_nothing() {
        let frame = RgbaImage::from_pixel(20, 20, GREEN);
        let result = segment(&frame, &HsvRange::default(), None).unwrap();
        assert_eq!(result.report, AreaReport::NotRequested);
        assert_eq!(result.report.percentage(), None);
        assert_eq!(result.rect, None);
        // green is outside the default range, so the output is untouched green
        assert!(result.annotated.pixels().all(|p| p == &GREEN));
    }

    #[test]
    fn test_blend_adds_weighted_mask() {
        let frame = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 10]));
        let result = segment(&frame, &HsvRange::default(), None).unwrap();
        // 0 + 178.5 rounds to even; red saturates
        assert_eq!(result.annotated.get_pixel(1, 1), &Rgba([255, 178, 178, 255]));
    }

    #[test]
    fn test_half_frame_percentage() {
        let frame = half_red(100, 40);
        let result = segment(&frame, &HsvRange::default(), Some(RectSpec::new(40, 20))).unwrap();
        let stats = result.report.stats().copied().unwrap();
        assert_eq!(stats.matching_px, 400);
        assert_eq!(stats.percentage, 50.0);
    }

    #[test]
    fn test_invert_complements_matching_pixels() {
        let frame = half_red(64, 48);
        let rect = Some(RectSpec::new(30, 10));
        let plain = HsvRange::default();
        let inverted = HsvRange {
            invert: true,
            ..plain
        };

        let a = segment(&frame, &plain, rect).unwrap().report.stats().copied().unwrap();
        let b = segment(&frame, &inverted, rect).unwrap().report.stats().copied().unwrap();
        assert_eq!(b.matching_px, a.total_area_px - a.matching_px);
    }

    #[test]
    fn test_widening_hue_never_decreases_matches() {
        let frame = RgbaImage::from_fn(60, 60, |x, y| {
            let [r, g, b] = [(x * 4) as u8, (y * 4) as u8, 255 - (x * 2) as u8];
            Rgba([r, g, b, 255])
        });
        let mut range = HsvRange {
            sat_low: 0,
            val_low: 0,
            hue_high: 0,
            ..HsvRange::default()
        };
        let mut previous = 0;
        for hue_high in (0..=179).step_by(7) {
            range.hue_high = hue_high;
            let result = segment(&frame, &range, Some(RectSpec::new(60, 60))).unwrap();
            let matching = result.report.stats().unwrap().matching_px;
            assert!(matching >= previous, "hue_high {hue_high}: {matching} < {previous}");
            previous = matching;
        }
    }

    #[test]
    fn test_deterministic_output() {
        let frame = half_red(90, 70);
        let range = HsvRange::default();
        let a = segment(&frame, &range, Some(RectSpec::new(50, 30))).unwrap();
        let b = segment(&frame, &range, Some(RectSpec::new(50, 30))).unwrap();
        assert_eq!(a.annotated.as_raw(), b.annotated.as_raw());
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn test_rect_outline_and_label_are_drawn() {
        let frame = RgbaImage::from_pixel(300, 100, GREEN);
        let result = segment(&frame, &HsvRange::default(), Some(RectSpec::new(100, 50))).unwrap();
        // rectangle at x=100..=200, y=25..=75
        assert_eq!(result.annotated.get_pixel(100, 50), &Rgba([255, 0, 0, 255]));
        assert!(result.annotated.pixels().any(|p| p == &LABEL_COLOR));
    }

    #[test]
    fn test_degenerate_rect_reports_zero() {
        let frame = RgbaImage::from_pixel(30, 30, RED);
        let result = segment(&frame, &HsvRange::default(), Some(RectSpec::new(0, 10))).unwrap();
        assert!(matches!(result.report, AreaReport::InvalidRect(_)));
        assert_eq!(result.report.percentage(), Some(0.0));
        assert_eq!(result.report.label(), "Area: Invalid Rect");
    }
}
