use super::OutputSink;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Pushes the visible raster to a v4l2loopback device as raw YUYV
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // v4l2loopback takes raw frames written straight to the device node
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
            buffer: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

/// Full-range BT.601 luma
fn luma(r: i32, g: i32, b: i32) -> u8 {
    ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8
}

/// Full-range BT.601 chroma (Cb, Cr) centered on 128
fn chroma(r: i32, g: i32, b: i32) -> (u8, u8) {
    let cb = ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128;
    let cr = ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128;
    (cb.clamp(0, 255) as u8, cr.clamp(0, 255) as u8)
}

/// Pack RGBA into YUYV (Y0 U Y1 V per pixel pair) into `out`.
///
/// Alpha is ignored, so transparent canvas areas come out black. Chroma is
/// taken from the pair's mean color; an odd last column pairs with itself.
fn pack_yuyv(frame: &RgbaImage, out: &mut Vec<u8>) {
    out.clear();
    let width = frame.width() as usize;
    if width == 0 {
        return;
    }

    for row in frame.as_raw().chunks_exact(width * 4) {
        for pair in row.chunks(8) {
            let first = &pair[..4];
            let second = if pair.len() == 8 { &pair[4..] } else { first };
            let [r0, g0, b0] = [first[0], first[1], first[2]].map(i32::from);
            let [r1, g1, b1] = [second[0], second[1], second[2]].map(i32::from);

            let (u, v) = chroma((r0 + r1) / 2, (g0 + g1) / 2, (b0 + b1) / 2);
            out.extend_from_slice(&[luma(r0, g0, b0), u, luma(r1, g1, b1), v]);
        }
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        if frame.dimensions() == (self.width, self.height) {
            pack_yuyv(frame, &mut self.buffer);
        } else {
            let scaled = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
            pack_yuyv(&scaled, &mut self.buffer);
        }

        self.file
            .write_all(&self.buffer)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_yuyv_packs_pixel_pairs() {
        let frame = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        pack_yuyv(&frame, &mut out);
        assert_eq!(out.len(), 4 * 2 * 2);
        assert_eq!(&out[..4], &[77, 85, 77, 255]);
    }

    #[test]
    fn test_yuyv_odd_width_repeats_last_pixel() {
        let frame = RgbaImage::from_pixel(3, 1, Rgba([0, 0, 0, 0]));
        let mut out = vec![9; 3];
        pack_yuyv(&frame, &mut out);
        assert_eq!(out, vec![0, 128, 0, 128, 0, 128, 0, 128]);
    }

    #[test]
    fn test_white_is_full_luma_neutral_chroma() {
        let frame = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        let mut out = Vec::new();
        pack_yuyv(&frame, &mut out);
        assert_eq!(out, vec![255, 128, 255, 128]);
    }
}
