//! Calibration and pose solving capabilities used by the sessions.

use crate::session::Sample;
use camcal_solve::{
    calibrate_camera, solve_pnp, CalibrationError, CameraIntrinsics, Distortion, PnpOptions, Pose,
    PoseError, SolveOptions,
};
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Result of intrinsic calibration. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub camera_matrix: Matrix3<f64>,
    /// `(k1, k2, p1, p2, k3)`.
    pub distortion: Distortion,
    /// RMS reprojection error in pixels.
    pub rms: f64,
    pub image_size: (u32, u32),
}

impl Intrinsics {
    pub fn camera(&self) -> CameraIntrinsics {
        CameraIntrinsics::from_matrix(&self.camera_matrix)
    }
}

/// Solves camera intrinsics from every captured sample.
pub trait CalibrationSolver {
    fn calibrate(
        &self,
        samples: &[Sample],
        image_size: (u32, u32),
    ) -> Result<Intrinsics, CalibrationError>;
}

/// Solves the board pose in a single view with known intrinsics.
pub trait PoseSolver {
    fn solve_pose(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f32>],
        intrinsics: &Intrinsics,
    ) -> Result<Pose, PoseError>;
}

fn to_f64(points: &[Point2<f32>]) -> Vec<Point2<f64>> {
    points.iter().map(|p| p.cast::<f64>()).collect()
}

/// Zhang initialisation plus joint Levenberg-Marquardt refinement.
#[derive(Clone, Debug, Default)]
pub struct PlanarCalibrationSolver {
    pub options: SolveOptions,
}

impl PlanarCalibrationSolver {
    pub fn new(options: SolveOptions) -> Self {
        Self { options }
    }
}

impl CalibrationSolver for PlanarCalibrationSolver {
    fn calibrate(
        &self,
        samples: &[Sample],
        image_size: (u32, u32),
    ) -> Result<Intrinsics, CalibrationError> {
        let object: Vec<Vec<Point3<f64>>> =
            samples.iter().map(|s| s.object_points.clone()).collect();
        let image: Vec<Vec<Point2<f64>>> =
            samples.iter().map(|s| to_f64(&s.image_points)).collect();
        let result = calibrate_camera(&object, &image, image_size, &self.options)?;
        Ok(Intrinsics {
            camera_matrix: result.camera_matrix(),
            distortion: result.distortion,
            rms: result.rms,
            image_size: result.image_size,
        })
    }
}

/// Planar homography initialisation refined on reprojection error.
#[derive(Clone, Debug, Default)]
pub struct PlanarPoseSolver {
    pub options: PnpOptions,
}

impl PlanarPoseSolver {
    pub fn new(options: PnpOptions) -> Self {
        Self { options }
    }
}

impl PoseSolver for PlanarPoseSolver {
    fn solve_pose(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f32>],
        intrinsics: &Intrinsics,
    ) -> Result<Pose, PoseError> {
        solve_pnp(
            object_points,
            &to_f64(image_points),
            &intrinsics.camera(),
            &intrinsics.distortion,
            &self.options,
        )
    }
}
