//! Single-shot export of a finalized capture.
//!
//! One save writes three independent artifacts:
//! `<name>_processed.png`, `<name>_original.png` and `<name>_info.csv`.
//! A failure on one does not roll back or skip the others.

use crate::capture::CameraProvider;
use crate::config::HsvRange;
use crate::error::{Error, Result};
use crate::segmentation::AreaReport;
use crate::session::CaptureSession;
use chrono::NaiveDateTime;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "filename,timestamp,HueLow,HueHigh,SatLow,SatHigh,ValLow,ValHigh,rectShown,rectWidth,rectHeight,percentage,invertMask";

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    Cancelled,
}

/// Persistence collaborator: stores one named blob
pub trait SaveSink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<SaveOutcome>;
}

/// Writes artifacts into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl SaveSink for DirectorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<SaveOutcome> {
        if file_name.contains(['/', '\\']) {
            return Err(Error::save_failed(file_name, "name must not contain a path separator"));
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::save_failed(file_name, format!("{}: {e}", self.dir.display())))?;

        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes).map_err(|e| Error::save_failed(file_name, e))?;

        tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(SaveOutcome::Saved(path))
    }
}

/// `processed_YYYY-MM-DDTHH_MM_SS`
pub fn default_name(now: NaiveDateTime) -> String {
    format!("processed_{}", now.format("%Y-%m-%dT%H_%M_%S"))
}

/// Trim and replace whitespace runs with `_`. `None` means the save is cancelled.
pub fn sanitize_name(input: &str) -> Option<String> {
    let name = input.split_whitespace().collect::<Vec<_>>().join("_");
    (!name.is_empty()).then_some(name)
}

/// Everything a save needs, snapshotted from a finalized session
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub name: String,
    pub timestamp: NaiveDateTime,
    pub processed: &'a RgbaImage,
    pub original: &'a RgbaImage,
    pub range: HsvRange,
    pub rect_shown: bool,
    pub report: AreaReport,
}

impl<'a> ExportRequest<'a> {
    /// Snapshot `session` for saving under `name`.
    ///
    /// Refused unless the session is finalized with a completed result and no
    /// filter run outstanding.
    pub fn from_session<P: CameraProvider>(
        session: &'a CaptureSession<P>,
        name: String,
        timestamp: NaiveDateTime,
    ) -> Result<Self> {
        let view = session.view();
        let (Some(result), Some(captured), true) =
            (session.result(), session.captured(), view.export_enabled)
        else {
            return Err(Error::InvalidTransition {
                mode: session.mode(),
                action: "save",
            });
        };

        Ok(Self {
            name,
            timestamp,
            processed: &result.annotated,
            original: captured.image(),
            range: result.range,
            rect_shown: result.rect.is_some(),
            report: result.report,
        })
    }

    pub fn file_names(&self) -> [String; 3] {
        [
            format!("{}_processed.png", self.name),
            format!("{}_original.png", self.name),
            format!("{}_info.csv", self.name),
        ]
    }

    /// The metadata file: BOM, header and one row, CRLF separated
    pub fn info_csv(&self) -> String {
        let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
        let r = &self.range;

        let (width, height, percentage) = match (self.rect_shown, self.report) {
            (true, AreaReport::Measured(stats)) => (
                stats.rect.w.to_string(),
                stats.rect.h.to_string(),
                format!("{:.1}", stats.percentage),
            ),
            (true, AreaReport::InvalidRect(rect)) => {
                (rect.w.to_string(), rect.h.to_string(), "N/A".to_string())
            }
            _ => ("N/A".to_string(), "N/A".to_string(), "N/A".to_string()),
        };

        let row = [
            format!("\"{}\"", self.name),
            format!("\"{}\"", self.timestamp.format("%Y-%m-%d %H_%M_%S")),
            r.hue_low.to_string(),
            r.hue_high.to_string(),
            r.sat_low.to_string(),
            r.sat_high.to_string(),
            r.val_low.to_string(),
            r.val_high.to_string(),
            yes_no(self.rect_shown).to_string(),
            width,
            height,
            percentage,
            yes_no(r.invert).to_string(),
        ]
        .join(",");

        format!("{UTF8_BOM}{CSV_HEADER}\r\n{row}")
    }
}

pub fn encode_png(image: &RgbaImage) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Per-artifact outcome of one save
#[derive(Debug, Default)]
pub struct ExportReport {
    pub saved: Vec<PathBuf>,
    pub cancelled: Vec<String>,
    pub failed: Vec<Error>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

/// Write all three artifacts through `sink`
pub fn export(request: &ExportRequest<'_>, sink: &mut dyn SaveSink) -> ExportReport {
    let _span = tracing::info_span!("export", name = %request.name).entered();
    let [processed_name, original_name, csv_name] = request.file_names();

    let artifacts: [(String, Result<Vec<u8>>); 3] = [
        (
            processed_name.clone(),
            encode_png(request.processed).map_err(|e| Error::save_failed(&processed_name, e)),
        ),
        (
            original_name.clone(),
            encode_png(request.original).map_err(|e| Error::save_failed(&original_name, e)),
        ),
        (csv_name, Ok(request.info_csv().into_bytes())),
    ];

    let mut report = ExportReport::default();
    for (file_name, bytes) in artifacts {
        match bytes.and_then(|bytes| sink.save(&file_name, &bytes)) {
            Ok(SaveOutcome::Saved(path)) => report.saved.push(path),
            Ok(SaveOutcome::Cancelled) => {
                tracing::info!("Save of {} cancelled", file_name);
                report.cancelled.push(file_name);
            }
            Err(e) => {
                tracing::error!("{}", e);
                report.failed.push(e);
            }
        }
    }

    report
}
