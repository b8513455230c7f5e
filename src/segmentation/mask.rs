use super::hsv::HsvImage;
use crate::config::HsvRange;
use crate::geometry::RoiRect;
use ndarray::{s, Array2};

pub const SET: u8 = 255;

/// Binary mask: 255 where a pixel matched, 0 elsewhere
///
/// Stored row-major as `[height, width]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<u8>,
}

impl Mask {
    /// Threshold an HSV raster against the inclusive bounds of `range`.
    ///
    /// The invert flag is not applied here; see [`Mask::invert`].
    pub fn threshold(hsv: &HsvImage, range: &HsvRange) -> Self {
        let (width, height) = hsv.dimensions();
        let lower = range.lower();
        let upper = range.upper();

        let data = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            let p = hsv.get_pixel(x as u32, y as u32);
            let inside = (0..3).all(|c| lower[c] <= p[c] && p[c] <= upper[c]);
            if inside {
                SET
            } else {
                0
            }
        });

        Self { data }
    }

    /// Flip every bit
    pub fn invert(&mut self) {
        self.data.mapv_inplace(|v| !v);
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.data[[y as usize, x as usize]] != 0
    }

    pub fn count_set(&self) -> u64 {
        self.data.iter().filter(|&&v| v != 0).count() as u64
    }

    /// Number of set pixels inside `rect`, or `None` if `rect` is degenerate
    /// or does not fit inside the mask
    pub fn count_in(&self, rect: &RoiRect) -> Option<u64> {
        if rect.is_degenerate() || rect.x < 0 || rect.y < 0 {
            return None;
        }
        let (x0, y0) = (rect.x as usize, rect.y as usize);
        let (x1, y1) = (x0 + rect.w as usize, y0 + rect.h as usize);
        if x1 > self.data.ncols() || y1 > self.data.nrows() {
            return None;
        }

        let roi = self.data.slice(s![y0..y1, x0..x1]);
        Some(roi.iter().filter(|&&v| v != 0).count() as u64)
    }
}
