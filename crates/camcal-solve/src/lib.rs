//! Camera model and solvers for planar-target calibration.
//!
//! - [`calibrate_camera`]: intrinsics plus Brown-Conrady distortion from several
//!   views of a board on `z = 0` (Zhang initialisation, then joint
//!   Levenberg-Marquardt refinement with `num-dual` Jacobians).
//! - [`solve_pnp`]: board pose in one view given known intrinsics.
//!
//! Everything runs in `f64` and is deterministic.

mod calibrate;
mod camera;
mod error;
mod pnp;
mod pose;
mod residual;
mod zhang;

pub use calibrate::{calibrate_camera, CalibrationResult, SolveOptions};
pub use camera::{project_point, CameraIntrinsics, Distortion};
pub use error::{CalibrationError, PoseError};
pub use pnp::{solve_pnp, PnpOptions};
pub use pose::Pose;
