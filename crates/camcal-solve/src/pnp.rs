//! Pose of a planar target from one view.

use crate::camera::{CameraIntrinsics, Distortion};
use crate::error::PoseError;
use crate::pose::Pose;
use crate::residual::{reprojection_residual, CAMERA_DIM, POSE_DIM};
use camcal_core::estimate_homography;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Matrix3, Point2, Point3, Rotation3, SVector, Vector3};
use num_dual::{jacobian, DualSVec64};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

pub(crate) const UNDISTORT_ITERS: usize = 20;
const PLANAR_EPS: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnpOptions {
    /// Levenberg-Marquardt patience after the homography initialisation.
    pub max_iters: usize,
}

impl Default for PnpOptions {
    fn default() -> Self {
        Self { max_iters: 50 }
    }
}

/// Decompose a plane-induced homography `H ~ K [r1 r2 t]` into a pose.
///
/// The rotation is projected onto SO(3) and the sign is chosen so the board
/// lies in front of the camera.
pub(crate) fn pose_from_homography(k_inv: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
    let k_inv_h1 = k_inv * h.column(0);
    let k_inv_h2 = k_inv * h.column(1);
    let k_inv_h3 = k_inv * h.column(2);

    let avg_norm = 0.5 * (k_inv_h1.norm() + k_inv_h2.norm());
    if avg_norm < 1e-12 {
        return None;
    }
    let mut lambda = 1.0 / avg_norm;
    if k_inv_h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r_mat.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let rotation = Rotation3::from_matrix_unchecked(u * v_t);
    let t: Vector3<f64> = lambda * k_inv_h3;

    let pose = Pose::from_rotation(&rotation, t);
    pose.is_finite().then_some(pose)
}

struct PnpProblem<'a> {
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    camera: [f64; CAMERA_DIM],
    params: SVector<f64, POSE_DIM>,
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for PnpProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_column_slice(self.params.as_slice())
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(DVector::from_iterator(
            2 * self.object.len(),
            self.object.iter().zip(self.image).flat_map(|(o, i)| {
                reprojection_residual(&self.camera, self.params.as_slice(), o, i)
            }),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let (_, j) = jacobian(
            |pose: SVector<DualSVec64<POSE_DIM>, POSE_DIM>| {
                let camera = self.camera.map(nalgebra::convert::<f64, DualSVec64<POSE_DIM>>);
                DVector::from_iterator(
                    2 * self.object.len(),
                    self.object
                        .iter()
                        .zip(self.image)
                        .flat_map(|(o, i)| reprojection_residual(&camera, pose.as_slice(), o, i)),
                )
            },
            &self.params,
        );
        Some(DMatrix::from_column_slice(j.nrows(), j.ncols(), j.as_slice()))
    }
}

/// Pose of the board (points on `z = 0`) relative to the camera.
///
/// Initialised from the homography between the board plane and the
/// undistorted normalized image points, then refined by minimizing the
/// pixel reprojection error.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(points = object_points.len()))
)]
pub fn solve_pnp(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    opts: &PnpOptions,
) -> Result<Pose, PoseError> {
    if object_points.len() != image_points.len() {
        return Err(PoseError::PointCountMismatch {
            object: object_points.len(),
            image: image_points.len(),
        });
    }
    if object_points.len() < 4 {
        return Err(PoseError::TooFewPoints {
            got: object_points.len(),
        });
    }
    if object_points.iter().any(|p| p.z.abs() > PLANAR_EPS) {
        return Err(PoseError::NonPlanarTarget);
    }
    if !intrinsics.is_valid() {
        return Err(PoseError::InvalidIntrinsics);
    }

    let board: Vec<Point2<f64>> = object_points.iter().map(|p| p.xy()).collect();
    let normalized: Vec<Point2<f64>> = image_points
        .iter()
        .map(|&p| distortion.undistort(intrinsics.normalize(p), UNDISTORT_ITERS))
        .collect();

    let h = estimate_homography(&board, &normalized).ok_or(PoseError::DegenerateHomography)?;
    let initial =
        pose_from_homography(&Matrix3::identity(), &h.h).ok_or(PoseError::DegenerateHomography)?;

    let d = distortion;
    let problem = PnpProblem {
        object: object_points,
        image: image_points,
        camera: [
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy,
            d.k1,
            d.k2,
            d.p1,
            d.p2,
            d.k3,
        ],
        params: SVector::from(initial.to_params()),
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(opts.max_iters.max(1))
        .minimize(problem);

    let pose = Pose::from_params(problem.params.as_slice());
    let cost = problem
        .residuals()
        .map_or(f64::NAN, |r| r.norm_squared());
    if !pose.is_finite() || !cost.is_finite() {
        return Err(PoseError::NonFinite);
    }
    debug!(
        "pnp: {} evaluations ({:?}), rms {:.4} px",
        report.number_of_evaluations,
        report.termination,
        (cost / object_points.len() as f64).sqrt()
    );
    Ok(pose)
}
