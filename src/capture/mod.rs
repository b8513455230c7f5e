mod v4l_capture;

pub use v4l_capture::{NokhwaProvider, WebcamCapture};

use crate::error::{Error, Result};
use image::RgbaImage;

/// Trait for camera capture sources
///
/// Dropping a source closes it and releases the device.
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbaImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

/// A camera as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: u32,
    pub label: String,
}

/// Which way a camera points, guessed from its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera
    Environment,
    /// Front camera
    User,
}

impl Facing {
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Facing::Environment => &["back", "rear", "environment"],
            Facing::User => &["front", "user"],
        }
    }

    pub fn matches(self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.keywords().iter().any(|k| label.contains(k))
    }
}

/// How the user picked a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    Index(u32),
    Facing(Facing),
}

impl Default for DeviceSelector {
    fn default() -> Self {
        DeviceSelector::Index(0)
    }
}

impl std::str::FromStr for DeviceSelector {
    type Err = String;

    /// `0`, `1`, ... or `front` / `back`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "front" | "user" => Ok(DeviceSelector::Facing(Facing::User)),
            "back" | "rear" | "environment" => Ok(DeviceSelector::Facing(Facing::Environment)),
            other => other
                .parse()
                .map(DeviceSelector::Index)
                .map_err(|_| format!("expected a camera index, 'front' or 'back', got '{s}'")),
        }
    }
}

/// Frame source collaborator: lists and opens cameras
pub trait CameraProvider {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open a stream on `device`. Close it by dropping the returned source.
    fn open(&mut self, device: &DeviceDescriptor) -> Result<Box<dyn CaptureSource>>;

    /// Enumerate, resolve `selector`, and open the match
    fn open_selected(&mut self, selector: DeviceSelector) -> Result<Box<dyn CaptureSource>> {
        let devices = self.enumerate()?;
        let device = resolve_device(&devices, selector)?;
        tracing::info!("Opening camera {} ({})", device.index, device.label);
        self.open(&device)
    }
}

/// Pick a device for `selector`.
///
/// A facing hint that no label matches falls back to the first device.
pub fn resolve_device(
    devices: &[DeviceDescriptor],
    selector: DeviceSelector,
) -> Result<DeviceDescriptor> {
    if devices.is_empty() {
        return Err(Error::NotFound("no camera devices found".to_string()));
    }

    match selector {
        DeviceSelector::Index(index) => devices
            .iter()
            .find(|d| d.index == index)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no camera with index {index}"))),
        DeviceSelector::Facing(facing) => {
            let device = devices
                .iter()
                .find(|d| facing.matches(&d.label))
                .unwrap_or_else(|| {
                    tracing::debug!("no {:?} camera label, using the first device", facing);
                    &devices[0]
                });
            Ok(device.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor {
                index: 0,
                label: "Front Camera".to_string(),
            },
            DeviceDescriptor {
                index: 2,
                label: "camera2 1, facing back".to_string(),
            },
        ]
    }

    #[test]
    fn test_resolve_by_index() {
        let d = resolve_device(&devices(), DeviceSelector::Index(2)).unwrap();
        assert_eq!(d.index, 2);
        assert!(matches!(
            resolve_device(&devices(), DeviceSelector::Index(1)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_by_facing() {
        let rear = resolve_device(&devices(), DeviceSelector::Facing(Facing::Environment)).unwrap();
        assert_eq!(rear.index, 2);
        let front = resolve_device(&devices(), DeviceSelector::Facing(Facing::User)).unwrap();
        assert_eq!(front.index, 0);
    }

    #[test]
    fn test_facing_falls_back_to_first() {
        let unlabeled = vec![DeviceDescriptor {
            index: 4,
            label: "USB Video".to_string(),
        }];
        let d = resolve_device(&unlabeled, DeviceSelector::Facing(Facing::Environment)).unwrap();
        assert_eq!(d.index, 4);
    }

    #[test]
    fn test_no_devices() {
        assert!(matches!(
            resolve_device(&[], DeviceSelector::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!("3".parse(), Ok(DeviceSelector::Index(3)));
        assert_eq!("Back".parse(), Ok(DeviceSelector::Facing(Facing::Environment)));
        assert_eq!("front".parse(), Ok(DeviceSelector::Facing(Facing::User)));
        assert!("left".parse::<DeviceSelector>().is_err());
    }
}
