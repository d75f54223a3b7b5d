use crate::frame::FrameError;
use crate::session::SessionError;
use camcal_solve::{CalibrationError, PoseError};
use std::path::PathBuf;

/// Terminal errors of the interactive workflow.
///
/// A frame without a detected board is never an error.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("Cannot open camera: {0}")]
    DeviceUnavailable(#[source] FrameError),

    #[error("Can't receive frame. Exiting ...")]
    StreamEnded,

    #[error("frame source failed: {0}")]
    Frame(#[source] FrameError),

    #[error("Not enough images for calibration. Need at least {min}.")]
    InsufficientSamples { count: usize, min: usize },

    #[error("calibration failed: {0}")]
    CalibrationFailed(#[source] CalibrationError),

    #[error("pose estimation failed: {0}")]
    PoseSolveFailed(#[source] PoseError),

    #[error("failed to save {}: {source}", path.display())]
    SaveFrame {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("display failed: {0}")]
    Display(String),

    #[error(transparent)]
    Session(SessionError),

    #[error("failed to write report: {0}")]
    Console(#[from] std::io::Error),
}

impl From<SessionError> for WorkflowError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InsufficientSamples { count, min } => {
                Self::InsufficientSamples { count, min }
            }
            SessionError::CalibrationFailed(e) => Self::CalibrationFailed(e),
            SessionError::PoseSolveFailed(e) => Self::PoseSolveFailed(e),
            other => Self::Session(other),
        }
    }
}

impl From<FrameError> for WorkflowError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::StreamEnded => Self::StreamEnded,
            other => Self::Frame(other),
        }
    }
}
