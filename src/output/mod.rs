mod loopback;
mod preview;

pub use loopback::V4L2Output;
pub use preview::PngPreview;

use anyhow::Result;
use image::RgbaImage;

/// Trait for display surfaces the visible raster is pushed to
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()>;
}
