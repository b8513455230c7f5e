use super::mask::Mask;
use crate::config::HsvRange;
use crate::geometry::{RectSpec, RoiRect};
use image::RgbaImage;

/// Areal statistics for the ROI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchStats {
    /// The clipped rectangle that was measured
    pub rect: RoiRect,
    pub total_area_px: u64,
    pub matching_px: u64,
    /// `100 * matching_px / total_area_px`, 0 for an empty area
    pub percentage: f64,
}

impl MatchStats {
    pub fn new(rect: RoiRect, matching_px: u64) -> Self {
        let total_area_px = rect.area();
        let percentage = if total_area_px > 0 {
            matching_px as f64 / total_area_px as f64 * 100.0
        } else {
            0.0
        };
        Self {
            rect,
            total_area_px,
            matching_px,
            percentage,
        }
    }
}

/// What the filter could say about the ROI
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaReport {
    /// The rectangle is hidden, so nothing was measured
    NotRequested,
    /// The clipped rectangle has no area; reported as 0%
    InvalidRect(RoiRect),
    Measured(MatchStats),
}

impl AreaReport {
    pub fn stats(&self) -> Option<&MatchStats> {
        match self {
            AreaReport::Measured(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn percentage(&self) -> Option<f64> {
        match self {
            AreaReport::NotRequested => None,
            AreaReport::InvalidRect(_) => Some(0.0),
            AreaReport::Measured(stats) => Some(stats.percentage),
        }
    }

    /// Text rendered onto the processed frame
    pub fn label(&self) -> String {
        match self {
            AreaReport::NotRequested => "Area: N/A".to_string(),
            AreaReport::InvalidRect(_) => "Area: Invalid Rect".to_string(),
            AreaReport::Measured(stats) => format!("Area: {:.1}%", stats.percentage),
        }
    }
}

/// Output of one filter run
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Blended frame with ROI outline and percentage label, opaque RGBA
    pub annotated: RgbaImage,
    /// The thresholded (and possibly inverted) mask before blending
    pub mask: Mask,
    pub report: AreaReport,
    /// Bounds the run filtered with
    pub range: HsvRange,
    /// Rectangle the run measured, `None` when hidden
    pub rect: Option<RectSpec>,
}
