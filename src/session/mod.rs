//! Capture state machine.
//!
//! A [`CaptureSession`] owns the active [`FrameSource`] and moves between
//! three modes:
//!
//! ```text
//!             start(camera)                    start(still)
//!                  |                                |
//!                  v                                v
//!            LiveCamera --finalize--+   +--finalize-- ManipulatingStill
//!                  ^                |   |                   ^
//!   undo (reopen)  |                v   v                   | undo (resume)
//!                  +------------- Finalized ----------------+
//! ```
//!
//! Filter runs are requested on entering `Finalized` and on every parameter
//! change while finalized. They are deferred: the request only reserves the
//! [`RunGate`] and the caller executes it later with
//! [`CaptureSession::run_pending`]. A request made while one is outstanding
//! is dropped.

mod gate;

pub use gate::{RunGate, RunPermit};

use crate::capture::{CameraProvider, CaptureSource, DeviceSelector};
use crate::config::{Bound, HsvRange, SessionConfig};
use crate::error::{Error, Result};
use crate::geometry::{compute_rect, RectSpec, Transform, BUTTON_ZOOM_STEP, WHEEL_ZOOM_STEP};
use crate::segmentation::{draw_roi_rgba, segment, Segmentation};
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No source yet, or the last one failed to open
    Idle,
    LiveCamera,
    ManipulatingStill,
    Finalized,
}

/// The visual source currently owned by the session
pub enum FrameSource {
    None,
    Camera(Box<dyn CaptureSource>),
    StillImage(RgbaImage),
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSource::None => write!(f, "None"),
            FrameSource::Camera(source) => write!(f, "Camera({:?})", source.resolution()),
            FrameSource::StillImage(image) => write!(f, "StillImage({:?})", image.dimensions()),
        }
    }
}

/// What to start
#[derive(Debug)]
pub enum SourceRequest {
    Camera(DeviceSelector),
    Still(RgbaImage),
}

/// Raster snapshot taken at finalization
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    image: RgbaImage,
}

impl CapturedFrame {
    pub fn new(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::InvalidFrame(format!(
                "zero-area frame {}x{}",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Which raster the user is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Camera feed or the still being manipulated, with the ROI guide
    Live,
    /// The filtered capture
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct View {
    pub mode: Mode,
    pub surface: Surface,
    pub export_enabled: bool,
    pub processing: bool,
}

/// Outcome of asking for a filter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRequest {
    /// Reserved; execute with `run_pending`
    Scheduled,
    /// Another run is outstanding; this request was ignored
    Dropped,
    /// Not finalized, so there is nothing to filter
    Skipped,
}

/// A reserved filter run with the inputs it will use
struct PendingRun {
    _permit: RunPermit,
    range: HsvRange,
    rect: Option<RectSpec>,
}

pub struct CaptureSession<P: CameraProvider> {
    provider: P,
    source: FrameSource,
    selector: DeviceSelector,
    mode: Mode,
    transform: Transform,
    canvas: (u32, u32),
    candidate: Option<RgbaImage>,
    captured: Option<CapturedFrame>,
    config: SessionConfig,
    gate: RunGate,
    pending: Option<PendingRun>,
    result: Option<Segmentation>,
    render_loop: bool,
}

impl<P: CameraProvider> CaptureSession<P> {
    pub fn new(provider: P, config: SessionConfig) -> Self {
        Self {
            provider,
            source: FrameSource::None,
            selector: DeviceSelector::default(),
            mode: Mode::Idle,
            transform: Transform::new(),
            canvas: (0, 0),
            candidate: None,
            captured: None,
            config,
            gate: RunGate::new(),
            pending: None,
            result: None,
            render_loop: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas
    }

    /// The frame finalize would capture right now (never has the ROI guide)
    pub fn candidate(&self) -> Option<&RgbaImage> {
        self.candidate.as_ref()
    }

    pub fn captured(&self) -> Option<&CapturedFrame> {
        self.captured.as_ref()
    }

    /// Latest completed filter result
    pub fn result(&self) -> Option<&Segmentation> {
        self.result.as_ref()
    }

    /// Whether the live render loop should keep ticking
    pub fn render_loop_active(&self) -> bool {
        self.render_loop
    }

    pub fn view(&self) -> View {
        let surface = match self.mode {
            Mode::Finalized => Surface::Processed,
            _ => Surface::Live,
        };
        View {
            mode: self.mode,
            surface,
            export_enabled: self.mode == Mode::Finalized
                && self.result.is_some()
                && !self.gate.is_busy(),
            processing: self.gate.is_busy(),
        }
    }

    /// Replace the frame source.
    ///
    /// The previous source is torn down first (camera closed, render loop
    /// cancelled). If a camera fails to open the session is left `Idle`.
    pub fn start(&mut self, request: SourceRequest) -> Result<Mode> {
        if let SourceRequest::Still(image) = &request {
            if image.width() == 0 || image.height() == 0 {
                return Err(Error::InvalidFrame("loaded image has no pixels".to_string()));
            }
        }

        self.teardown();

        match request {
            SourceRequest::Camera(selector) => {
                self.selector = selector;
                let camera = self.provider.open_selected(selector)?;
                self.canvas = camera.resolution();
                self.source = FrameSource::Camera(camera);
                self.mode = Mode::LiveCamera;
                self.render_loop = true;
            }
            SourceRequest::Still(image) => {
                self.canvas = image.dimensions();
                self.source = FrameSource::StillImage(image);
                self.mode = Mode::ManipulatingStill;
                self.render_still();
            }
        }

        tracing::info!("Started {:?} source, canvas {:?}", self.source, self.canvas);
        Ok(self.mode)
    }

    /// Drop the current source and everything derived from it
    pub fn teardown(&mut self) {
        if !matches!(self.source, FrameSource::None) {
            tracing::debug!("Tearing down {:?}", self.source);
        }
        self.render_loop = false;
        self.source = FrameSource::None;
        self.mode = Mode::Idle;
        self.transform.reset();
        self.candidate = None;
        self.captured = None;
        self.pending = None;
        self.result = None;
    }

    /// One render loop iteration: pull a camera frame into the candidate.
    ///
    /// Returns `false` (and cancels the loop) once there is no live camera.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.render_loop || self.mode != Mode::LiveCamera {
            self.render_loop = false;
            return Ok(false);
        }
        let FrameSource::Camera(camera) = &mut self.source else {
            tracing::debug!("Render loop stopping: no active camera");
            self.render_loop = false;
            return Ok(false);
        };

        let frame = camera.capture_frame()?;
        self.canvas = frame.dimensions();
        self.candidate = Some(frame);
        Ok(true)
    }

    fn render_still(&mut self) {
        if let FrameSource::StillImage(image) = &self.source {
            let (w, h) = self.canvas;
            self.candidate = Some(self.transform.render(image, w, h));
        }
    }

    fn require_editable(&self, action: &'static str) -> Result<()> {
        if self.mode == Mode::ManipulatingStill {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                mode: self.mode,
                action,
            })
        }
    }

    fn canvas_center(&self) -> (f64, f64) {
        (self.canvas.0 as f64 / 2.0, self.canvas.1 as f64 / 2.0)
    }

    /// Zoom about `pivot`, or the canvas center when `None`
    pub fn zoom(&mut self, factor: f64, pivot: Option<(f64, f64)>) -> Result<()> {
        self.require_editable("zoom")?;
        let pivot = pivot.unwrap_or_else(|| self.canvas_center());
        self.transform.zoom(factor, pivot);
        self.render_still();
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<()> {
        self.zoom(BUTTON_ZOOM_STEP, None)
    }

    pub fn zoom_out(&mut self) -> Result<()> {
        self.zoom(1.0 / BUTTON_ZOOM_STEP, None)
    }

    /// Mouse wheel: negative `delta_y` zooms in, about the cursor
    pub fn wheel(&mut self, delta_y: f64, cursor: (f64, f64)) -> Result<()> {
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_STEP
        } else {
            1.0 / WHEEL_ZOOM_STEP
        };
        self.zoom(factor, Some(cursor))
    }

    pub fn begin_drag(&mut self, pointer: (f64, f64)) -> Result<()> {
        self.require_editable("drag")?;
        self.transform.begin_drag(pointer);
        Ok(())
    }

    /// Follow the pointer during a drag; a no-op when no drag is active
    pub fn drag_to(&mut self, pointer: (f64, f64)) -> Result<()> {
        self.require_editable("drag")?;
        if self.transform.drag_to(pointer) {
            self.render_still();
        }
        Ok(())
    }

    pub fn end_drag(&mut self) {
        self.transform.end_drag();
    }

    pub fn reset_view(&mut self) -> Result<()> {
        self.require_editable("reset the view")?;
        self.transform.reset();
        self.render_still();
        Ok(())
    }

    /// Freeze the visible frame and request a filter run.
    ///
    /// Fails with `InvalidFrame` and leaves the state unchanged when there is
    /// no source or the frame has no pixels.
    pub fn finalize(&mut self) -> Result<FilterRequest> {
        match self.mode {
            Mode::LiveCamera => {
                // grab the freshest frame rather than whatever the loop last drew
                self.render_loop = true;
                self.tick()?;
            }
            Mode::ManipulatingStill => self.render_still(),
            Mode::Idle => {
                return Err(Error::InvalidFrame("no source to capture from".to_string()));
            }
            Mode::Finalized => {
                return Err(Error::InvalidTransition {
                    mode: self.mode,
                    action: "finalize",
                });
            }
        }

        let frame = self
            .candidate
            .clone()
            .ok_or_else(|| Error::InvalidFrame("no frame has been drawn yet".to_string()))?;
        let captured = CapturedFrame::new(frame)?;

        tracing::info!("Finalized {:?} frame", captured.dimensions());
        self.captured = Some(captured);
        self.transform.end_drag();
        self.render_loop = false;
        self.mode = Mode::Finalized;
        self.result = None;

        Ok(self.request_filter())
    }

    /// Leave `Finalized`: reopen the camera, or resume editing the still
    pub fn undo_finalize(&mut self) -> Result<Mode> {
        if self.mode != Mode::Finalized {
            return Err(Error::InvalidTransition {
                mode: self.mode,
                action: "undo finalize",
            });
        }

        match &self.source {
            FrameSource::Camera(_) => {
                let selector = self.selector;
                self.start(SourceRequest::Camera(selector))
            }
            FrameSource::StillImage(_) => {
                self.captured = None;
                self.pending = None;
                self.result = None;
                self.mode = Mode::ManipulatingStill;
                self.render_still();
                tracing::info!("Resumed still manipulation");
                Ok(self.mode)
            }
            FrameSource::None => {
                self.teardown();
                Ok(self.mode)
            }
        }
    }

    /// The capture button: finalize when live, undo when finalized
    pub fn toggle_capture(&mut self) -> Result<()> {
        if self.mode == Mode::Finalized {
            self.undo_finalize().map(|_| ())
        } else {
            self.finalize().map(|_| ())
        }
    }

    /// Reserve a filter run with the current parameters
    pub fn request_filter(&mut self) -> FilterRequest {
        if self.mode != Mode::Finalized || self.captured.is_none() {
            return FilterRequest::Skipped;
        }

        match self.gate.try_acquire() {
            Some(permit) => {
                self.pending = Some(PendingRun {
                    _permit: permit,
                    range: self.config.range,
                    rect: self.config.active_rect(),
                });
                tracing::debug!("Filter run scheduled");
                FilterRequest::Scheduled
            }
            None => {
                tracing::debug!("Filter run already in flight, dropping request");
                FilterRequest::Dropped
            }
        }
    }

    /// Execute the reserved run, if any. The gate is released afterwards
    /// whether the run succeeded or not.
    pub fn run_pending(&mut self) -> Option<Result<&Segmentation>> {
        let run = self.pending.take()?;
        let Some(captured) = &self.captured else {
            return Some(Err(Error::InvalidFrame("captured frame went away".to_string())));
        };

        let outcome = segment(captured.image(), &run.range, run.rect);
        drop(run);

        Some(match outcome {
            Ok(segmentation) => {
                if let Some(p) = segmentation.report.percentage() {
                    tracing::info!("Filter applied, area {:.1}%", p);
                } else {
                    tracing::info!("Filter applied");
                }
                Ok(&*self.result.insert(segmentation))
            }
            Err(e) => {
                tracing::error!("Filter failed: {}", e);
                Err(e)
            }
        })
    }

    fn parameters_changed(&mut self) -> FilterRequest {
        match self.mode {
            Mode::Finalized => self.request_filter(),
            _ => FilterRequest::Skipped,
        }
    }

    pub fn set_bound(&mut self, bound: Bound, value: u32) -> Result<FilterRequest> {
        self.config.range.set(bound, value)?;
        Ok(self.parameters_changed())
    }

    pub fn set_invert(&mut self, invert: bool) -> FilterRequest {
        self.config.range.invert = invert;
        self.parameters_changed()
    }

    pub fn set_show_rect(&mut self, show: bool) -> FilterRequest {
        self.config.show_rect = show;
        self.parameters_changed()
    }

    pub fn set_rect(&mut self, rect: RectSpec) -> FilterRequest {
        if self.config.rect == rect {
            return FilterRequest::Skipped;
        }
        tracing::info!("Rectangle size changed to {}", rect);
        self.config.rect = rect;
        self.parameters_changed()
    }

    /// Apply a config file; on error nothing changes
    pub fn load_config(&mut self, json: &str) -> Result<FilterRequest> {
        self.config.load(json)?;
        Ok(self.parameters_changed())
    }

    pub fn reset_config(&mut self) -> FilterRequest {
        self.config.reset();
        self.parameters_changed()
    }

    pub fn export_config(&self) -> String {
        self.config.export()
    }

    /// The raster for the visible surface.
    ///
    /// Live: the candidate with the ROI guide drawn on a copy.
    /// Processed: the latest filter result, or the bare capture while the
    /// first run is outstanding.
    pub fn display_frame(&self) -> Option<RgbaImage> {
        match self.view().surface {
            Surface::Live => {
                let mut frame = self.candidate.clone()?;
                if let Some(spec) = self.config.active_rect() {
                    let rect = compute_rect(frame.width(), frame.height(), spec);
                    draw_roi_rgba(&mut frame, &rect);
                }
                Some(frame)
            }
            Surface::Processed => match (&self.result, &self.captured) {
                (Some(result), _) => Some(result.annotated.clone()),
                (None, Some(captured)) => Some(captured.image().clone()),
                (None, None) => None,
            },
        }
    }
}
