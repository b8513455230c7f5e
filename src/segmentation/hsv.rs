use image::{Rgb, RgbImage, RgbaImage};

/// 8-bit HSV raster: channel 0 = hue (0-179), 1 = saturation, 2 = value
pub type HsvImage = image::ImageBuffer<Rgb<u8>, Vec<u8>>;

const SHIFT: i32 = 12;
const HALF: i32 = 1 << (SHIFT - 1);

/// Drop alpha, keeping the color channels untouched
pub fn rgba_to_rgb(frame: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.get_pixel(x, y);
        Rgb([p[0], p[1], p[2]])
    })
}

/// Opaque RGBA from RGB
pub fn rgb_to_rgba(image: &RgbImage) -> RgbaImage {
    image::DynamicImage::ImageRgb8(image.clone()).to_rgba8()
}

/// Convert one RGB pixel to 8-bit HSV with hue halved into 0-179.
///
/// Fixed-point arithmetic with 12 fractional bits and round-to-nearest, the
/// same scheme OpenCV uses for `COLOR_BGR2HSV` on 8-bit input, so thresholds
/// tuned there carry over unchanged.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0 {
        0
    } else {
        let sdiv = ((255 << SHIFT) as f64 / v as f64).round() as i32;
        (diff * sdiv + HALF) >> SHIFT
    };

    let h = if diff == 0 {
        0
    } else {
        let raw = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let hdiv = ((180 << SHIFT) as f64 / (6.0 * diff as f64)).round() as i32;
        let h = (raw * hdiv + HALF) >> SHIFT;
        if h < 0 {
            h + 180
        } else {
            h
        }
    };

    [h.clamp(0, 179) as u8, s.clamp(0, 255) as u8, v as u8]
}

pub fn to_hsv(image: &RgbImage) -> HsvImage {
    let mut hsv = HsvImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(hsv.pixels_mut()) {
        *dst = Rgb(rgb_to_hsv(src[0], src[1], src[2]));
    }
    hsv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_colors() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(255, 255, 0), [30, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 255), [90, 255, 255]);
        assert_eq!(rgb_to_hsv(255, 0, 255), [150, 255, 255]);
    }

    #[test]
    fn test_grays_have_no_hue_or_saturation() {
        for v in [0u8, 1, 77, 128, 255] {
            assert_eq!(rgb_to_hsv(v, v, v), [0, 0, v]);
        }
    }

    #[test]
    fn test_hue_wraps_below_red() {
        // slightly bluish red sits at the top of the hue range
        let [h, s, v] = rgb_to_hsv(255, 0, 20);
        assert!(h >= 170, "hue {h}");
        assert_eq!((s, v), (255, 255));
    }

    #[test]
    fn test_half_saturation() {
        let [_, s, v] = rgb_to_hsv(255, 128, 128);
        assert_eq!(v, 255);
        assert_eq!(s, 127);
    }

    #[test]
    fn test_alpha_is_dropped_and_restored_opaque() {
        let frame = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let rgb = rgba_to_rgb(&frame);
        assert_eq!(rgb.get_pixel(2, 1), &Rgb([1, 2, 3]));
        assert_eq!(rgb_to_rgba(&rgb).get_pixel(0, 0), &image::Rgba([1, 2, 3, 255]));
    }
}
