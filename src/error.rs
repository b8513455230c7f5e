use crate::session::Mode;

/// Errors surfaced to the user through the status line
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The camera backend refused access
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No device matched the request
    #[error("camera not found: {0}")]
    NotFound(String),

    /// Any other camera backend failure (stream open, frame decode)
    #[error("camera error: {0}")]
    Camera(String),

    /// Finalize was attempted without a usable frame
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A zero-area raster reached the segmentation engine
    #[error("empty frame")]
    EmptyFrame,

    /// A config file was rejected; nothing was applied
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Writing one export artifact failed
    #[error("failed to save {file}: {reason}")]
    SaveFailed { file: String, reason: String },

    /// Still image bytes could not be decoded
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The action is not available in the current mode
    #[error("cannot {action} in {mode:?} mode")]
    InvalidTransition { mode: Mode, action: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn save_failed(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SaveFailed {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}
