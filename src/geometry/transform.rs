use image::{Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 10.0;

/// Zoom factor for the zoom in/out buttons
pub const BUTTON_ZOOM_STEP: f64 = 1.2;
/// Zoom factor for one mouse wheel notch
pub const WHEEL_ZOOM_STEP: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragAnchor {
    pointer: (f64, f64),
    offset: (f64, f64),
}

/// Pan & zoom state for a loaded still image
///
/// Maps source image coordinates into canvas coordinates as
/// `canvas = source * scale + offset`: the image is translated by the offset
/// (in canvas pixels) and then scaled about its own top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    drag: Option<DragAnchor>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            drag: None,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> (f64, f64) {
        (self.offset_x, self.offset_y)
    }

    /// Scale by `factor` while keeping the canvas point `pivot` fixed
    ///
    /// The resulting scale is clamped to `[MIN_SCALE, MAX_SCALE]`; the pivot
    /// correction uses the clamped ratio so the pivot stays put even at the
    /// limits.
    pub fn zoom(&mut self, factor: f64, pivot: (f64, f64)) {
        let new_scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = new_scale / self.scale;

        self.offset_x = (self.offset_x - pivot.0) * ratio + pivot.0;
        self.offset_y = (self.offset_y - pivot.1) * ratio + pivot.1;
        self.scale = new_scale;

        let anchored = self.to_source(pivot);
        tracing::debug!(
            "zoom x{:.3} about ({:.1}, {:.1}) -> scale {:.3}, image point ({:.1}, {:.1}) held",
            factor,
            pivot.0,
            pivot.1,
            self.scale,
            anchored.0,
            anchored.1
        );
    }

    /// Translate relative to the offset held when the drag started
    ///
    /// Without an active drag the current offset is the anchor.
    pub fn drag(&mut self, dx: f64, dy: f64) {
        let (ax, ay) = self
            .drag
            .map(|anchor| anchor.offset)
            .unwrap_or((self.offset_x, self.offset_y));
        self.offset_x = ax + dx;
        self.offset_y = ay + dy;
    }

    pub fn begin_drag(&mut self, pointer: (f64, f64)) {
        self.drag = Some(DragAnchor {
            pointer,
            offset: (self.offset_x, self.offset_y),
        });
    }

    /// Move an active drag to `pointer`. Returns false when no drag is active.
    pub fn drag_to(&mut self, pointer: (f64, f64)) -> bool {
        let Some(anchor) = self.drag else {
            return false;
        };
        self.drag(pointer.0 - anchor.pointer.0, pointer.1 - anchor.pointer.1);
        true
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Canvas point -> source image point
    pub fn to_source(&self, canvas: (f64, f64)) -> (f64, f64) {
        (
            (canvas.0 - self.offset_x) / self.scale,
            (canvas.1 - self.offset_y) / self.scale,
        )
    }

    /// Draw `image` into a fresh transparent canvas of the given size.
    ///
    /// The returned raster is exactly what finalization captures: it never
    /// contains the ROI overlay, which is drawn later on a display copy.
    pub fn render(&self, image: &RgbaImage, canvas_w: u32, canvas_h: u32) -> RgbaImage {
        let mut canvas = RgbaImage::new(canvas_w, canvas_h);
        if canvas_w == 0 || canvas_h == 0 || image.width() == 0 || image.height() == 0 {
            return canvas;
        }

        let s = self.scale as f32;
        #[rustfmt::skip]
        let matrix = [
            s,   0.0, self.offset_x as f32,
            0.0, s,   self.offset_y as f32,
            0.0, 0.0, 1.0,
        ];

        // scale is clamped away from zero, so the matrix is always invertible
        match Projection::from_matrix(matrix) {
            Some(projection) => warp_into(
                image,
                &projection,
                Interpolation::Nearest,
                Rgba([0, 0, 0, 0]),
                &mut canvas,
            ),
            None => tracing::warn!("non-invertible view transform {:?}", self),
        }

        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: (f64, f64), b: (f64, f64)) {
        assert!(
            (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn test_zoom_keeps_pivot_fixed() {
        let mut t = Transform::new();
        t.drag(13.0, -7.0);

        for &(factor, pivot) in &[
            (1.2, (320.0, 240.0)),
            (1.0 / 1.1, (17.0, 400.0)),
            (3.7, (0.0, 0.0)),
            (0.5, (-50.0, 12.5)),
        ] {
            let before = t.to_source(pivot);
            t.zoom(factor, pivot);
            assert_close(t.to_source(pivot), before);
        }
    }

    #[test]
    fn test_zoom_clamps_scale() {
        let mut t = Transform::new();
        for _ in 0..50 {
            t.zoom(BUTTON_ZOOM_STEP, (100.0, 100.0));
        }
        assert_eq!(t.scale(), MAX_SCALE);

        let before = t.to_source((100.0, 100.0));
        t.zoom(2.0, (100.0, 100.0));
        assert_eq!(t.scale(), MAX_SCALE);
        assert_close(t.to_source((100.0, 100.0)), before);

        for _ in 0..100 {
            t.zoom(1.0 / WHEEL_ZOOM_STEP, (5.0, 5.0));
        }
        assert_eq!(t.scale(), MIN_SCALE);
    }

    #[test]
    fn test_drag_is_relative_to_drag_start() {
        let mut t = Transform::new();
        t.drag(10.0, 10.0);

        t.begin_drag((100.0, 100.0));
        assert!(t.drag_to((105.0, 90.0)));
        assert!(t.drag_to((120.0, 130.0)));
        assert_eq!(t.offset(), (30.0, 40.0));
        t.end_drag();

        assert!(!t.drag_to((0.0, 0.0)));
        assert_eq!(t.offset(), (30.0, 40.0));
    }

    #[test]
    fn test_drag_does_not_touch_scale() {
        let mut t = Transform::new();
        t.zoom(2.0, (0.0, 0.0));
        t.begin_drag((0.0, 0.0));
        t.drag_to((4.0, 4.0));
        assert_eq!(t.scale(), 2.0);
    }

    #[test]
    fn test_reset() {
        let mut t = Transform::new();
        t.zoom(3.0, (7.0, 9.0));
        t.begin_drag((1.0, 1.0));
        t.reset();
        assert_eq!(t, Transform::default());
        assert!(!t.drag_to((5.0, 5.0)));
    }

    #[test]
    fn test_render_identity_copies_image() {
        let image = RgbaImage::from_fn(8, 6, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 7, 255]));
        let canvas = Transform::new().render(&image, 8, 6);
        assert_eq!(canvas, image);
    }

    #[test]
    fn test_render_translates_in_canvas_pixels() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
        let mut t = Transform::new();
        t.drag(3.0, 0.0);
        let canvas = t.render(&image, 10, 4);

        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.get_pixel(3, 0), &Rgba([200, 10, 10, 255]));
        assert_eq!(canvas.get_pixel(6, 3), &Rgba([200, 10, 10, 255]));
        assert_eq!(canvas.get_pixel(9, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_render_scales_after_translation() {
        let image = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut t = Transform::new();
        t.zoom(4.0, (0.0, 0.0));
        t.drag(4.0, 0.0);
        let canvas = t.render(&image, 12, 4);

        // offset stays 4 canvas pixels; each source pixel spans 4 canvas pixels
        assert_eq!(canvas.get_pixel(0, 0)[3], 0);
        assert_eq!(canvas.get_pixel(5, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(8, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(canvas.get_pixel(11, 0)[3], 0);
    }
}
