use thiserror::Error;

/// Errors returned by [`crate::calibrate_camera`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("need at least {min} views, got {got}")]
    NotEnoughViews { min: usize, got: usize },

    #[error("view {view}: {object} object points but {image} image points")]
    PointCountMismatch {
        view: usize,
        object: usize,
        image: usize,
    },

    #[error("view {view}: need at least 4 points, got {got}")]
    TooFewPoints { view: usize, got: usize },

    #[error("view {view}: calibration target is not planar (z != 0)")]
    NonPlanarTarget { view: usize },

    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("view {view}: homography estimation failed")]
    DegenerateHomography { view: usize },

    #[error("intrinsics initialisation failed: {0}")]
    DegenerateIntrinsics(&'static str),

    #[error("optimisation produced non-finite parameters")]
    NonFinite,
}

/// Errors returned by [`crate::solve_pnp`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoseError {
    #[error("{object} object points but {image} image points")]
    PointCountMismatch { object: usize, image: usize },

    #[error("need at least 4 points, got {got}")]
    TooFewPoints { got: usize },

    #[error("object points are not on the z = 0 plane")]
    NonPlanarTarget,

    #[error("invalid camera intrinsics")]
    InvalidIntrinsics,

    #[error("homography estimation failed")]
    DegenerateHomography,

    #[error("pose refinement produced non-finite parameters")]
    NonFinite,
}
