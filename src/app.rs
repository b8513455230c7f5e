//! Thin adapter between textual UI events and the capture session.
//!
//! Each line of input is one event, e.g. `camera back`, `open leaf.png`,
//! `wheel -1 320 240`, `set hueHigh 25`, `capture`, `save my leaf`.
//! Every outcome lands on the [`StatusLine`].

use crate::capture::{CameraProvider, DeviceSelector};
use crate::config::Bound;
use crate::error::{Error, Result};
use crate::export::{default_name, export, sanitize_name, ExportRequest, SaveOutcome, SaveSink};
use crate::geometry::RectSpec;
use crate::session::{CaptureSession, FilterRequest, Mode, SourceRequest};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How long a transient notice stays up
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

pub const CONFIG_FILE_NAME: &str = "hsv_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    /// Capture toggle
    Space,
    /// Save under the default name
    Enter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Camera(DeviceSelector),
    ListDevices,
    OpenImage(PathBuf),
    ZoomIn,
    ZoomOut,
    Wheel { delta_y: f64, x: f64, y: f64 },
    Press(f64, f64),
    Move(f64, f64),
    Release,
    ResetView,
    Capture,
    Undo,
    SetBound(Bound, u32),
    Invert(bool),
    ShowRect(bool),
    RectSize(RectSpec),
    LoadConfig(PathBuf),
    ResetConfig,
    ExportConfig,
    /// `None` uses the default name; an empty name cancels
    Save(Option<String>),
    Shortcuts(bool),
    Key(Shortcut),
    Wait(Duration),
    Quit,
}

fn parse_switch(word: Option<&str>) -> std::result::Result<bool, String> {
    match word {
        Some("on" | "yes" | "true") => Ok(true),
        Some("off" | "no" | "false") => Ok(false),
        other => Err(format!("expected on/off, got {other:?}")),
    }
}

fn parse_point<'a>(mut args: impl Iterator<Item = &'a str>) -> std::result::Result<(f64, f64), String> {
    let mut next = || -> std::result::Result<f64, String> {
        let word = args.next().ok_or("expected x and y")?;
        word.parse().map_err(|_| format!("'{word}' is not a number"))
    };
    Ok((next()?, next()?))
}

impl FromStr for UiEvent {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let mut args = rest.split_whitespace();

        let event = match command.to_lowercase().as_str() {
            "camera" => UiEvent::Camera(match args.next() {
                Some(word) => word.parse()?,
                None => DeviceSelector::default(),
            }),
            "devices" => UiEvent::ListDevices,
            "open" if !rest.is_empty() => UiEvent::OpenImage(PathBuf::from(rest)),
            "zoom" => match args.next() {
                Some("in") => UiEvent::ZoomIn,
                Some("out") => UiEvent::ZoomOut,
                other => return Err(format!("expected 'zoom in' or 'zoom out', got {other:?}")),
            },
            "wheel" => {
                let delta_y = args
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or("expected a wheel delta")?;
                let (x, y) = parse_point(args)?;
                UiEvent::Wheel { delta_y, x, y }
            }
            "press" => {
                let (x, y) = parse_point(args)?;
                UiEvent::Press(x, y)
            }
            "move" => {
                let (x, y) = parse_point(args)?;
                UiEvent::Move(x, y)
            }
            "release" => UiEvent::Release,
            "reset-view" => UiEvent::ResetView,
            "capture" => UiEvent::Capture,
            "undo" => UiEvent::Undo,
            "set" => {
                let key = args.next().ok_or("expected a bound name")?;
                let bound = Bound::from_key(key).ok_or_else(|| format!("unknown bound '{key}'"))?;
                let value = args
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| format!("expected a value for {}", bound.key()))?;
                UiEvent::SetBound(bound, value)
            }
            "invert" => UiEvent::Invert(parse_switch(args.next())?),
            "rect" => match args.next() {
                Some(word @ ("on" | "off" | "yes" | "no" | "true" | "false")) => {
                    UiEvent::ShowRect(parse_switch(Some(word))?)
                }
                Some(size) => UiEvent::RectSize(size.parse()?),
                None => return Err("expected on/off or a size like 400x200".to_string()),
            },
            "load" if !rest.is_empty() => UiEvent::LoadConfig(PathBuf::from(rest)),
            "reset" => UiEvent::ResetConfig,
            "export-config" => UiEvent::ExportConfig,
            "save" => match rest {
                "" => UiEvent::Save(None),
                "\"\"" => UiEvent::Save(Some(String::new())),
                name => UiEvent::Save(Some(name.to_string())),
            },
            "shortcuts" => UiEvent::Shortcuts(parse_switch(args.next())?),
            "space" => UiEvent::Key(Shortcut::Space),
            "enter" => UiEvent::Key(Shortcut::Enter),
            "wait" => {
                let ms = args
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or("expected milliseconds")?;
                UiEvent::Wait(Duration::from_millis(ms))
            }
            "quit" | "exit" => UiEvent::Quit,
            _ => return Err(format!("unrecognised command '{line}'")),
        };

        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Message {
    Notice { text: String, until: Instant },
    Error(String),
}

/// A visible change of the status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Shown(String),
    Cleared,
}

/// The single place outcomes are shown to the user.
///
/// Notices expire after [`NOTICE_TTL`]; errors stay until replaced.
#[derive(Debug, Default)]
pub struct StatusLine {
    message: Option<Message>,
    shown: Option<String>,
}

impl StatusLine {
    pub fn notice(&mut self, text: impl Into<String>, now: Instant) {
        let text = text.into();
        tracing::info!("{}", text);
        self.message = Some(Message::Notice {
            text,
            until: now + NOTICE_TTL,
        });
    }

    pub fn error(&mut self, error: &Error) {
        tracing::error!("{}", error);
        self.message = Some(Message::Error(error.to_string()));
    }

    pub fn clear(&mut self) {
        self.message = None;
    }

    pub fn is_error(&self) -> bool {
        matches!(self.message, Some(Message::Error(_)))
    }

    pub fn current(&self, now: Instant) -> Option<&str> {
        match &self.message {
            Some(Message::Notice { text, until }) if now < *until => Some(text),
            Some(Message::Error(text)) => Some(text),
            _ => None,
        }
    }

    /// What the line shows at `now`, if that differs from the last poll.
    /// Expired notices are dropped here.
    pub fn poll(&mut self, now: Instant) -> Option<StatusChange> {
        if self.current(now).is_none() {
            self.message = None;
        }
        let current = self.current(now).map(str::to_owned);
        if current == self.shown {
            return None;
        }

        self.shown = current.clone();
        Some(match current {
            Some(text) => StatusChange::Shown(text),
            None => StatusChange::Cleared,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct App<P: CameraProvider> {
    session: CaptureSession<P>,
    sink: Box<dyn SaveSink>,
    status: StatusLine,
    shortcuts: bool,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

impl<P: CameraProvider> App<P> {
    pub fn new(session: CaptureSession<P>, sink: Box<dyn SaveSink>) -> Self {
        Self {
            session,
            sink,
            status: StatusLine::default(),
            shortcuts: true,
            clock: local_now,
        }
    }

    /// Replace the wall clock used for default save names and CSV timestamps
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &CaptureSession<P> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CaptureSession<P> {
        &mut self.session
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusLine {
        &mut self.status
    }

    /// Apply one event; failures go to the status line
    pub fn handle(&mut self, event: UiEvent, now: Instant) -> Control {
        if event == UiEvent::Quit {
            return Control::Quit;
        }
        tracing::debug!("event {:?}", event);

        match self.apply(event, now) {
            Ok(Some(notice)) => self.status.notice(notice, now),
            Ok(None) => {}
            Err(e) => self.status.error(&e),
        }
        Control::Continue
    }

    fn filtered(&self, request: FilterRequest) -> Option<String> {
        match request {
            FilterRequest::Dropped => {
                Some("Still processing; the change applies on the next update".to_string())
            }
            FilterRequest::Scheduled | FilterRequest::Skipped => None,
        }
    }

    fn apply(&mut self, event: UiEvent, now: Instant) -> Result<Option<String>> {
        let session = &mut self.session;
        let notice = match event {
            UiEvent::Camera(selector) => {
                session.start(SourceRequest::Camera(selector))?;
                self.status.clear();
                None
            }
            UiEvent::ListDevices => {
                let devices = session.provider().enumerate()?;
                for device in &devices {
                    tracing::info!("  [{}] {}", device.index, device.label);
                }
                Some(format!("{} camera(s) found", devices.len()))
            }
            UiEvent::OpenImage(path) => {
                let image = image::open(&path)?.to_rgba8();
                session.start(SourceRequest::Still(image))?;
                Some(format!(
                    "Loaded {}; adjust the view, then capture",
                    path.display()
                ))
            }
            UiEvent::ZoomIn => session.zoom_in().map(|_| None)?,
            UiEvent::ZoomOut => session.zoom_out().map(|_| None)?,
            UiEvent::Wheel { delta_y, x, y } => session.wheel(delta_y, (x, y)).map(|_| None)?,
            UiEvent::Press(x, y) => session.begin_drag((x, y)).map(|_| None)?,
            UiEvent::Move(x, y) => session.drag_to((x, y)).map(|_| None)?,
            UiEvent::Release => {
                session.end_drag();
                None
            }
            UiEvent::ResetView => session.reset_view().map(|_| None)?,
            UiEvent::Capture => {
                session.toggle_capture()?;
                None
            }
            UiEvent::Undo => {
                session.undo_finalize()?;
                None
            }
            UiEvent::SetBound(bound, value) => {
                let request = session.set_bound(bound, value)?;
                self.filtered(request)
            }
            UiEvent::Invert(on) => {
                let request = session.set_invert(on);
                self.filtered(request)
            }
            UiEvent::ShowRect(on) => {
                let request = session.set_show_rect(on);
                self.filtered(request)
            }
            UiEvent::RectSize(rect) => {
                let request = session.set_rect(rect);
                self.filtered(request)
            }
            UiEvent::LoadConfig(path) => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
                let request = session.load_config(&json)?;
                self.filtered(request)
                    .or_else(|| Some(format!("Loaded config {}", path.display())))
            }
            UiEvent::ResetConfig => {
                let request = session.reset_config();
                self.filtered(request)
                    .or_else(|| Some("HSV filter reset".to_string()))
            }
            UiEvent::ExportConfig => {
                let json = session.export_config();
                match self.sink.save(CONFIG_FILE_NAME, json.as_bytes())? {
                    SaveOutcome::Saved(path) => Some(format!("Saved config {}", path.display())),
                    SaveOutcome::Cancelled => None,
                }
            }
            UiEvent::Save(name) => self.save(name)?,
            UiEvent::Shortcuts(on) => {
                self.shortcuts = on;
                None
            }
            UiEvent::Key(key) => return self.shortcut(key, now),
            UiEvent::Wait(_) | UiEvent::Quit => None,
        };
        Ok(notice)
    }

    /// Shortcuts act like their button and are ignored while it is disabled
    fn shortcut(&mut self, key: Shortcut, now: Instant) -> Result<Option<String>> {
        if !self.shortcuts {
            return Ok(None);
        }
        match key {
            Shortcut::Space if self.session.mode() != Mode::Idle => {
                self.apply(UiEvent::Capture, now)
            }
            Shortcut::Enter if self.session.view().export_enabled => {
                self.apply(UiEvent::Save(None), now)
            }
            _ => Ok(None),
        }
    }

    fn save(&mut self, name: Option<String>) -> Result<Option<String>> {
        let timestamp = (self.clock)();
        let name = match name {
            None => default_name(timestamp),
            Some(raw) => match sanitize_name(&raw) {
                Some(name) => name,
                None => return Ok(Some("Save cancelled".to_string())),
            },
        };

        let request = ExportRequest::from_session(&self.session, name, timestamp)?;
        let report = export(&request, self.sink.as_mut());
        if report.is_complete() {
            return Ok(Some(format!("Saved images and info for {}", request.name)));
        }

        if let Some(error) = report.failed.into_iter().next() {
            return Err(error);
        }
        Ok(Some(format!(
            "Save partly cancelled; {} file(s) written",
            report.saved.len()
        )))
    }

    /// Execute a deferred filter run, reporting failures on the status line
    pub fn run_pending(&mut self) {
        if let Some(Err(e)) = self.session.run_pending() {
            self.status.error(&e);
        }
    }
}
