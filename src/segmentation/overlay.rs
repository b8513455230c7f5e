use crate::geometry::RoiRect;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Pixel, Rgb, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, Canvas};
use imageproc::rect::Rect;

pub const ROI_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LABEL_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Outline thickness, centered on the rectangle edge
pub const ROI_THICKNESS: i32 = 3;

/// Glyph scale for the 8x8 font
const LABEL_SCALE: u32 = 2;

/// Stroke `rect` onto `canvas`.
///
/// The edge runs from `(x, y)` to `(x + w, y + h)` inclusive and is widened
/// symmetrically to [`ROI_THICKNESS`]. Degenerate rectangles draw nothing.
pub fn draw_roi<C>(canvas: &mut C, rect: &RoiRect, color: C::Pixel)
where
    C: Canvas,
{
    if rect.is_degenerate() {
        tracing::debug!("skipping degenerate ROI {:?}", rect);
        return;
    }

    let half = ROI_THICKNESS / 2;
    for grow in -half..=half {
        let w = rect.w + 1 + 2 * grow as i64;
        let h = rect.h + 1 + 2 * grow as i64;
        if w <= 0 || h <= 0 {
            continue;
        }
        let outline =
            Rect::at(rect.x as i32 - grow, rect.y as i32 - grow).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, outline, color);
    }
}

/// Convenience for RGBA display frames
pub fn draw_roi_rgba(canvas: &mut RgbaImage, rect: &RoiRect) {
    draw_roi(canvas, rect, ROI_COLOR.to_rgba());
}

/// Render `text` with its top-left corner at `(x, y)`, clipping at the edges
pub fn draw_label(canvas: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>) {
    let scale = LABEL_SCALE as i32;
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let mut cursor_x = x;

    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale;
            continue;
        };

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (*bits >> col) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = cursor_x + col * scale + sx;
                        let py = y + row as i32 * scale + sy;
                        if px >= 0 && py >= 0 && px < width && py < height {
                            canvas.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        cursor_x += 8 * scale;
    }
}

/// Height in pixels of one line drawn by [`draw_label`]
pub fn label_height() -> u32 {
    8 * LABEL_SCALE
}
