use super::{CameraProvider, CaptureSource, DeviceDescriptor};
use crate::error::{Error, Result};
use image::{RgbImage, RgbaImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::{Camera, NokhwaError};

/// Map a backend error onto the user-facing taxonomy
fn classify(context: &str, err: NokhwaError) -> Error {
    let message = format!("{context}: {err}");
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        Error::PermissionDenied(message)
    } else if lower.contains("not found") || lower.contains("no such") {
        Error::NotFound(message)
    } else {
        Error::Camera(message)
    }
}

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera =
            Camera::new(index, requested).map_err(|e| classify("Failed to open camera", e))?;

        camera
            .open_stream()
            .map_err(|e| classify("Failed to open camera stream", e))?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());

        tracing::info!("Webcam initialized at {}x{}", width, height);

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbaImage> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| classify("Failed to capture frame", e))?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| classify("Failed to decode frame", e))?;

        let (width, height) = (decoded.width(), decoded.height());
        let rgb = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| Error::Camera(format!("short frame buffer for {width}x{height}")))?;

        Ok(image::DynamicImage::ImageRgb8(rgb).to_rgba8())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        match self.camera.stop_stream() {
            Ok(()) => tracing::info!("Camera stream stopped"),
            Err(e) => tracing::warn!("Failed to stop camera stream: {}", e),
        }
    }
}

/// Cameras reachable through nokhwa's default backend
#[derive(Debug, Default)]
pub struct NokhwaProvider;

impl CameraProvider for NokhwaProvider {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let cameras =
            nokhwa::query(ApiBackend::Auto).map_err(|e| classify("Failed to list cameras", e))?;

        let devices = cameras
            .iter()
            .enumerate()
            .map(|(position, info)| {
                let index = info.index().as_index().unwrap_or(position as u32);
                let label = match info.human_name() {
                    name if name.trim().is_empty() => format!("Camera {}", position + 1),
                    name => name,
                };
                DeviceDescriptor { index, label }
            })
            .collect::<Vec<_>>();

        tracing::debug!("Found {} camera(s)", devices.len());
        Ok(devices)
    }

    fn open(&mut self, device: &DeviceDescriptor) -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(WebcamCapture::new(device.index)?))
    }
}
