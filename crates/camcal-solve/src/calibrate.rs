//! Planar intrinsic calibration: closed-form initialisation followed by joint
//! Levenberg-Marquardt refinement of intrinsics, distortion and per-view poses.

use crate::camera::{CameraIntrinsics, Distortion};
use crate::error::CalibrationError;
use crate::pnp::pose_from_homography;
use crate::pose::Pose;
use crate::residual::{reprojection_residual, CAMERA_DIM, POSE_DIM};
use crate::zhang::{focal_from_homographies, intrinsics_from_homographies};
use camcal_core::estimate_homography;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::{debug, info, warn};
use nalgebra::{storage::Owned, Const, DMatrix, DVector, Dyn, Matrix3, OMatrix, Point2, Point3, SVector};
use num_dual::{jacobian, DualSVec64};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

const PLANAR_EPS: f64 = 1e-9;
const LOCAL_DIM: usize = CAMERA_DIM + POSE_DIM;

/// Options for [`calibrate_camera`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Patience of the Levenberg-Marquardt solver: it may spend up to
    /// `max_iters * (n + 1)` residual evaluations for `n` free parameters.
    pub max_iters: usize,
    /// Keep `p1 = p2 = 0`.
    pub fix_tangential: bool,
    /// Keep `k3 = 0`.
    pub fix_k3: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            fix_tangential: false,
            fix_k3: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    /// Root mean square reprojection error over all points, in pixels.
    pub rms: f64,
    /// Board pose of every view, in input order.
    pub poses: Vec<Pose>,
    pub image_size: (u32, u32),
}

impl CalibrationResult {
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        self.intrinsics.camera_matrix()
    }
}

/// Parameter vector layout: `fx fy cx cy | k1 k2 [p1 p2] [k3] | (rvec tvec) * views`.
#[derive(Clone, Copy, Debug)]
struct Layout {
    fix_tangential: bool,
    fix_k3: bool,
    num_views: usize,
}

impl Layout {
    fn num_distortion(&self) -> usize {
        2 + if self.fix_tangential { 0 } else { 2 } + if self.fix_k3 { 0 } else { 1 }
    }

    fn pose_offset(&self, view: usize) -> usize {
        4 + self.num_distortion() + 6 * view
    }

    fn len(&self) -> usize {
        self.pose_offset(self.num_views)
    }

    fn pack(&self, k: &CameraIntrinsics, d: &Distortion, poses: &[Pose]) -> DVector<f64> {
        let mut v = vec![k.fx, k.fy, k.cx, k.cy, d.k1, d.k2];
        if !self.fix_tangential {
            v.extend([d.p1, d.p2]);
        }
        if !self.fix_k3 {
            v.push(d.k3);
        }
        for pose in poses {
            v.extend(pose.to_params());
        }
        debug_assert_eq!(v.len(), self.len());
        DVector::from_vec(v)
    }

    fn camera(&self, p: &DVector<f64>) -> (CameraIntrinsics, Distortion) {
        let k = CameraIntrinsics {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
        };
        let mut d = Distortion {
            k1: p[4],
            k2: p[5],
            ..Distortion::default()
        };
        let mut next = 6;
        if !self.fix_tangential {
            d.p1 = p[next];
            d.p2 = p[next + 1];
            next += 2;
        }
        if !self.fix_k3 {
            d.k3 = p[next];
        }
        (k, d)
    }

    fn pose(&self, p: &DVector<f64>, view: usize) -> Pose {
        let off = self.pose_offset(view);
        Pose::from_params(&p.as_slice()[off..off + POSE_DIM])
    }

    /// Global column of camera parameter `local` (`fx fy cx cy k1 k2 p1 p2 k3`),
    /// `None` when it is held fixed.
    fn camera_column(&self, local: usize) -> Option<usize> {
        match local {
            0..=5 => Some(local),
            6 | 7 => (!self.fix_tangential).then_some(local),
            8 => (!self.fix_k3).then_some(if self.fix_tangential { 6 } else { 8 }),
            _ => None,
        }
    }

    /// Full camera block followed by the pose of `view`.
    fn local(&self, p: &DVector<f64>, view: usize) -> SVector<f64, LOCAL_DIM> {
        let (k, d) = self.camera(p);
        let camera = [k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3];
        let pose = self.pose(p, view).to_params();
        SVector::from_iterator(camera.into_iter().chain(pose))
    }
}

struct CalibrationProblem<'a> {
    object_points: &'a [Vec<Point3<f64>>],
    image_points: &'a [Vec<Point2<f64>>],
    layout: Layout,
    num_residuals: usize,
    params: DVector<f64>,
}

impl CalibrationProblem<'_> {
    fn view_jacobian(&self, view: usize) -> (DVector<f64>, OMatrix<f64, Dyn, Const<LOCAL_DIM>>) {
        let obj = &self.object_points[view];
        let img = &self.image_points[view];
        jacobian(
            |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
                let (camera, pose) = p.as_slice().split_at(CAMERA_DIM);
                DVector::from_iterator(
                    2 * obj.len(),
                    obj.iter()
                        .zip(img)
                        .flat_map(|(o, i)| reprojection_residual(camera, pose, o, i)),
                )
            },
            &self.layout.local(&self.params, view),
        )
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CalibrationProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut r = DVector::zeros(self.num_residuals);
        let mut row = 0;
        for view in 0..self.layout.num_views {
            let local = self.layout.local(&self.params, view);
            let (camera, pose) = local.as_slice().split_at(CAMERA_DIM);
            for (o, i) in self.object_points[view].iter().zip(&self.image_points[view]) {
                let [ru, rv] = reprojection_residual(camera, pose, o, i);
                r[row] = ru;
                r[row + 1] = rv;
                row += 2;
            }
        }
        Some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jac = DMatrix::zeros(self.num_residuals, self.layout.len());
        let mut row = 0;
        for view in 0..self.layout.num_views {
            let (r_view, j_view) = self.view_jacobian(view);
            let pose_offset = self.layout.pose_offset(view);
            for r in 0..r_view.len() {
                for c in 0..CAMERA_DIM {
                    if let Some(col) = self.layout.camera_column(c) {
                        jac[(row + r, col)] = j_view[(r, c)];
                    }
                }
                for k in 0..POSE_DIM {
                    jac[(row + r, pose_offset + k)] = j_view[(r, CAMERA_DIM + k)];
                }
            }
            row += r_view.len();
        }
        Some(jac)
    }
}

fn validate_inputs(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: (u32, u32),
) -> Result<(), CalibrationError> {
    if object_points.is_empty() || object_points.len() != image_points.len() {
        return Err(CalibrationError::NotEnoughViews {
            min: 1,
            got: object_points.len().min(image_points.len()),
        });
    }
    if image_size.0 == 0 || image_size.1 == 0 {
        return Err(CalibrationError::InvalidImageSize {
            width: image_size.0,
            height: image_size.1,
        });
    }
    for (view, (obj, img)) in object_points.iter().zip(image_points).enumerate() {
        if obj.len() != img.len() {
            return Err(CalibrationError::PointCountMismatch {
                view,
                object: obj.len(),
                image: img.len(),
            });
        }
        if obj.len() < 4 {
            return Err(CalibrationError::TooFewPoints {
                view,
                got: obj.len(),
            });
        }
        if obj.iter().any(|p| p.z.abs() > PLANAR_EPS) {
            return Err(CalibrationError::NonPlanarTarget { view });
        }
    }
    Ok(())
}

fn plausible(k: &CameraIntrinsics, width: f64, height: f64) -> bool {
    let scale = width.max(height);
    k.is_valid()
        && (0.0..=width).contains(&k.cx)
        && (0.0..=height).contains(&k.cy)
        && k.fx > 0.05 * scale
        && k.fy > 0.05 * scale
        && k.fx < 100.0 * scale
        && k.fy < 100.0 * scale
}

fn initial_intrinsics(
    homographies: &[Matrix3<f64>],
    image_size: (u32, u32),
) -> Result<CameraIntrinsics, CalibrationError> {
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    match intrinsics_from_homographies(homographies) {
        Ok(k) if plausible(&k, w, h) => {
            debug!("closed-form intrinsics: {k:?}");
            return Ok(k);
        }
        Ok(k) => debug!("closed-form intrinsics rejected as implausible: {k:?}"),
        Err(e) => debug!("closed-form intrinsics unavailable: {e}"),
    }

    let k = focal_from_homographies(homographies, (w - 1.0) / 2.0, (h - 1.0) / 2.0)?;
    debug!("centered-principal-point intrinsics: {k:?}");
    Ok(k)
}

/// Calibrate a pinhole camera with Brown-Conrady distortion from views of
/// a planar target lying on `z = 0`.
///
/// Deterministic: identical inputs give identical outputs.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = object_points.len()))
)]
pub fn calibrate_camera(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: (u32, u32),
    opts: &SolveOptions,
) -> Result<CalibrationResult, CalibrationError> {
    validate_inputs(object_points, image_points, image_size)?;

    let homographies = object_points
        .iter()
        .zip(image_points)
        .enumerate()
        .map(|(view, (obj, img))| {
            let board: Vec<Point2<f64>> = obj.iter().map(|p| p.xy()).collect();
            estimate_homography(&board, img)
                .map(|h| h.h)
                .ok_or(CalibrationError::DegenerateHomography { view })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let k0 = initial_intrinsics(&homographies, image_size)?;
    let k_inv = k0
        .camera_matrix()
        .try_inverse()
        .ok_or(CalibrationError::DegenerateIntrinsics("camera matrix is singular"))?;
    let poses0 = homographies
        .iter()
        .enumerate()
        .map(|(view, h)| {
            pose_from_homography(&k_inv, h).ok_or(CalibrationError::DegenerateHomography { view })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let layout = Layout {
        fix_tangential: opts.fix_tangential,
        fix_k3: opts.fix_k3,
        num_views: object_points.len(),
    };
    let total_points: usize = object_points.iter().map(Vec::len).sum();
    let problem = CalibrationProblem {
        object_points,
        image_points,
        layout,
        num_residuals: 2 * total_points,
        params: layout.pack(&k0, &Distortion::default(), &poses0),
    };

    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(opts.max_iters.max(1))
        .minimize(problem);
    if !report.termination.was_successful() {
        warn!(
            "calibration stopped after {} evaluations: {:?}",
            report.number_of_evaluations, report.termination
        );
    }

    let params = problem.params();
    let (intrinsics, distortion) = layout.camera(&params);
    let poses: Vec<Pose> = (0..layout.num_views)
        .map(|view| layout.pose(&params, view))
        .collect();
    let cost = problem
        .residuals()
        .map_or(f64::NAN, |r| r.norm_squared());
    let rms = (cost / total_points as f64).sqrt();

    let finite = intrinsics.is_valid()
        && distortion.to_array().iter().all(|c| c.is_finite())
        && poses.iter().all(Pose::is_finite)
        && rms.is_finite();
    if !finite {
        return Err(CalibrationError::NonFinite);
    }

    info!(
        "calibrated {} views in {} evaluations, rms {:.4} px",
        layout.num_views, report.number_of_evaluations, rms
    );
    Ok(CalibrationResult {
        intrinsics,
        distortion,
        rms,
        poses,
        image_size,
    })
}
