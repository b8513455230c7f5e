use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Keeps a PNG file on disk in sync with the visible raster.
///
/// Frames are written to a sibling temp file and renamed into place so a
/// viewer polling the file never reads a half-written image. Identical
/// consecutive frames are skipped.
pub struct PngPreview {
    path: PathBuf,
    staging: PathBuf,
    last: Option<RgbaImage>,
}

impl PngPreview {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        tracing::info!("Writing preview frames to {}", path.display());
        Self {
            path,
            staging: PathBuf::from(staging),
            last: None,
        }
    }
}

impl OutputSink for PngPreview {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        if self.last.as_ref() == Some(frame) {
            return Ok(());
        }

        frame
            .save_with_format(&self.staging, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write preview {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("Failed to replace preview {}", self.path.display()))?;

        self.last = Some(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    #[test]
    fn test_preview_replaces_file() {
        let dir = tempdir().unwrap();
        let mut preview = PngPreview::new(dir.path().join("view.png"));

        let first = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]));
        preview.write_frame(&first).unwrap();
        let second = RgbaImage::from_pixel(5, 5, Rgba([9, 9, 9, 255]));
        preview.write_frame(&second).unwrap();

        let on_disk = image::open(dir.path().join("view.png")).unwrap().to_rgba8();
        assert_eq!(on_disk, second);
        assert!(!dir.path().join("view.png.tmp").exists());
    }

    #[test]
    fn test_preview_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let mut preview = PngPreview::new(dir.path().join("missing").join("view.png"));
        assert!(preview.write_frame(&RgbaImage::new(1, 1)).is_err());
    }
}
