//! End-to-end: camera -> finalize -> filter -> save, through the public API.

use hsv_roi::app::{App, UiEvent};
use hsv_roi::capture::{CameraProvider, CaptureSource, DeviceDescriptor, DeviceSelector, Facing};
use hsv_roi::config::{HsvRange, SessionConfig};
use hsv_roi::export::DirectorySink;
use hsv_roi::geometry::RectSpec;
use hsv_roi::segmentation::{segment, AreaReport};
use hsv_roi::session::{CaptureSession, FilterRequest, Mode, SourceRequest, Surface};
use hsv_roi::{Error, Result};
use image::{Rgba, RgbaImage};
use std::time::Instant;
use tempfile::tempdir;

const DEFAULT_CONFIG: &str = r#"{
  "hueLow": 0,
  "hueHigh": 10,
  "satLow": 100,
  "satHigh": 255,
  "valLow": 100,
  "valHigh": 255,
  "invertMask": false
}"#;

struct RedCamera;

impl CaptureSource for RedCamera {
    fn capture_frame(&mut self) -> Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255])))
    }

    fn resolution(&self) -> (u32, u32) {
        (100, 100)
    }
}

/// A front and a rear camera; only the rear one delivers frames
struct TwoCameras;

impl CameraProvider for TwoCameras {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(vec![
            DeviceDescriptor {
                index: 0,
                label: "Integrated Front Camera".to_string(),
            },
            DeviceDescriptor {
                index: 1,
                label: "USB Rear Camera".to_string(),
            },
        ])
    }

    fn open(&mut self, device: &DeviceDescriptor) -> Result<Box<dyn CaptureSource>> {
        match device.index {
            1 => Ok(Box::new(RedCamera)),
            _ => Err(Error::PermissionDenied(device.label.clone())),
        }
    }
}

#[test]
fn test_full_red_frame_covers_rectangle() {
    let mut config = SessionConfig::default();
    config.load(DEFAULT_CONFIG).unwrap();
    config.rect = RectSpec::new(50, 50);

    let mut session = CaptureSession::new(TwoCameras, config);
    let mode = session
        .start(SourceRequest::Camera(DeviceSelector::Facing(Facing::Environment)))
        .unwrap();
    assert_eq!(mode, Mode::LiveCamera);
    assert!(session.tick().unwrap());

    assert_eq!(session.finalize().unwrap(), FilterRequest::Scheduled);
    let result = session.run_pending().unwrap().unwrap();
    let stats = result.report.stats().unwrap();
    assert_eq!(stats.total_area_px, 2500);
    assert_eq!(stats.matching_px, 2500);
    assert_eq!(stats.percentage, 100.0);

    let view = session.view();
    assert_eq!(view.surface, Surface::Processed);
    assert!(view.export_enabled);
}

#[test]
fn test_front_camera_permission_denied() {
    let mut session = CaptureSession::new(TwoCameras, SessionConfig::default());
    let err = session
        .start(SourceRequest::Camera(DeviceSelector::Facing(Facing::User)))
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    assert_eq!(session.mode(), Mode::Idle);
}

#[test]
fn test_segment_is_deterministic() {
    let frame = RgbaImage::from_fn(64, 48, |x, y| Rgba([(x * 4) as u8, (y * 5) as u8, 90, 255]));
    let range = HsvRange {
        hue_low: 0,
        hue_high: 60,
        sat_low: 30,
        ..HsvRange::default()
    };

    let a = segment(&frame, &range, Some(RectSpec::new(32, 16))).unwrap();
    let b = segment(&frame, &range, Some(RectSpec::new(32, 16))).unwrap();
    assert_eq!(a.annotated.as_raw(), b.annotated.as_raw());
    assert_eq!(a.report, b.report);

    let none = segment(&frame, &range, None).unwrap();
    assert_eq!(none.report, AreaReport::NotRequested);
    assert_eq!(none.report.percentage(), None);
}

#[test]
fn test_app_round_trip_with_saved_artifacts() {
    let dir = tempdir().unwrap();
    let session = CaptureSession::new(TwoCameras, SessionConfig::default());
    let mut app = App::new(session, Box::new(DirectorySink::new(dir.path())));
    let now = Instant::now();

    for line in ["camera rear", "rect 40x20", "capture"] {
        app.handle(line.parse().unwrap(), now);
    }
    app.run_pending();
    app.handle(UiEvent::Save(Some("red run".to_string())), now);
    assert!(!app.status().is_error(), "{:?}", app.status().current(now));

    let csv = std::fs::read_to_string(dir.path().join("red_run_info.csv")).unwrap();
    let row = csv.split("\r\n").nth(1).unwrap();
    assert!(row.starts_with("\"red_run\","));
    assert!(row.ends_with(",0,10,100,255,100,255,Yes,40,20,100.0,No"), "{row}");

    let original = image::open(dir.path().join("red_run_original.png")).unwrap().to_rgba8();
    assert_eq!(original, RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255])));

    // undo reopens the camera and disables saving again
    app.handle(UiEvent::Capture, now);
    assert_eq!(app.session().mode(), Mode::LiveCamera);
    assert!(!app.session().view().export_enabled);
}
