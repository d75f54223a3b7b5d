//! Closed-form intrinsics initialisation from plane homographies.

use crate::camera::CameraIntrinsics;
use crate::error::CalibrationError;
use nalgebra::{DMatrix, DVector, Matrix3, SVector};

/// Build the 6-vector v_ij(H) as in Zhang's method.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form solution for `K` (skew dropped) from three or more
/// homographies.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
) -> Result<CameraIntrinsics, CalibrationError> {
    if homographies.len() < 3 {
        return Err(CalibrationError::DegenerateIntrinsics(
            "closed-form solution needs at least 3 views",
        ));
    }

    let m = homographies.len();
    let mut vmtx = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // V b = 0: singular vector of the smallest singular value.
    let svd = vmtx.svd(false, true);
    let sv = &svd.singular_values;
    if sv[0] <= 0.0 || sv[4] / sv[0] < 1e-9 {
        return Err(CalibrationError::DegenerateIntrinsics(
            "views are too similar to fix all intrinsics",
        ));
    }
    let v_t = svd
        .v_t
        .ok_or(CalibrationError::DegenerateIntrinsics("SVD failed"))?;
    let b = v_t.row(v_t.nrows() - 1);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-9 {
        return Err(CalibrationError::DegenerateIntrinsics(
            "views do not constrain the image of the absolute conic",
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(CalibrationError::DegenerateIntrinsics("invalid sign for λ"));
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k = CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
    };
    if !k.is_valid() {
        return Err(CalibrationError::DegenerateIntrinsics(
            "closed-form intrinsics are not finite",
        ));
    }
    Ok(k)
}

/// Focal lengths from homographies with the principal point fixed at `(cx, cy)`.
///
/// Each view gives two linear constraints on `(1/fx², 1/fy²)` from the
/// orthogonality and equal norm of the first two rotation columns. Works
/// from a single view and for near fronto-parallel sets where the full
/// closed form breaks down.
pub fn focal_from_homographies(
    homographies: &[Matrix3<f64>],
    cx: f64,
    cy: f64,
) -> Result<CameraIntrinsics, CalibrationError> {
    if homographies.is_empty() {
        return Err(CalibrationError::DegenerateIntrinsics("no views"));
    }

    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    let m = homographies.len();
    let mut a = DMatrix::<f64>::zeros(2 * m, 2);
    let mut rhs = DVector::<f64>::zeros(2 * m);
    for (k, h) in homographies.iter().enumerate() {
        let hc = shift * h;
        let hc = hc / hc.norm();
        let (h1, h2) = (hc.column(0), hc.column(1));

        a[(2 * k, 0)] = h1[0] * h2[0];
        a[(2 * k, 1)] = h1[1] * h2[1];
        rhs[2 * k] = -h1[2] * h2[2];

        a[(2 * k + 1, 0)] = h1[0] * h1[0] - h2[0] * h2[0];
        a[(2 * k + 1, 1)] = h1[1] * h1[1] - h2[1] * h2[1];
        rhs[2 * k + 1] = -(h1[2] * h1[2] - h2[2] * h2[2]);
    }

    let svd = a.svd(true, true);
    let sol = svd
        .solve(&rhs, 1e-12)
        .map_err(CalibrationError::DegenerateIntrinsics)?;
    let (inv_fx2, inv_fy2) = (sol[0], sol[1]);
    if !(inv_fx2 > 0.0 && inv_fy2 > 0.0) {
        return Err(CalibrationError::DegenerateIntrinsics(
            "views do not constrain the focal length",
        ));
    }

    let k = CameraIntrinsics {
        fx: inv_fx2.sqrt().recip(),
        fy: inv_fy2.sqrt().recip(),
        cx,
        cy,
    };
    if !k.is_valid() {
        return Err(CalibrationError::DegenerateIntrinsics(
            "focal length is not finite",
        ));
    }
    Ok(k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn kmtx() -> Matrix3<f64> {
        Matrix3::new(900.0, 0.0, 640.0, 0.0, 880.0, 360.0, 0.0, 0.0, 1.0)
    }

    /// For a Z=0 plane, H = K [r1 r2 t].
    fn synthetic_homography(rot: Rotation3<f64>, t: Vector3<f64>) -> Matrix3<f64> {
        let k = kmtx();
        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    fn views() -> Vec<Matrix3<f64>> {
        vec![
            synthetic_homography(
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ]
    }

    #[test]
    fn closed_form_recovers_kmtx() {
        let k = intrinsics_from_homographies(&views()).unwrap();
        assert!((k.fx - 900.0).abs() < 1e-3, "fx {}", k.fx);
        assert!((k.fy - 880.0).abs() < 1e-3, "fy {}", k.fy);
        assert!((k.cx - 640.0).abs() < 1e-3, "cx {}", k.cx);
        assert!((k.cy - 360.0).abs() < 1e-3, "cy {}", k.cy);
    }

    #[test]
    fn closed_form_needs_three_views() {
        let v = views();
        assert!(matches!(
            intrinsics_from_homographies(&v[..2]),
            Err(CalibrationError::DegenerateIntrinsics(_))
        ));
    }

    #[test]
    fn fixed_center_recovers_focal_from_one_view() {
        let v = views();
        let k = focal_from_homographies(&v[..1], 640.0, 360.0).unwrap();
        assert!((k.fx - 900.0).abs() < 1e-3, "fx {}", k.fx);
        assert!((k.fy - 880.0).abs() < 1e-3, "fy {}", k.fy);
    }

    #[test]
    fn fronto_parallel_views_are_degenerate() {
        let flat: Vec<_> = (0..4)
            .map(|i| {
                synthetic_homography(
                    Rotation3::identity(),
                    Vector3::new(0.01 * i as f64, 0.0, 1.0),
                )
            })
            .collect();
        assert!(intrinsics_from_homographies(&flat).is_err());
        assert!(focal_from_homographies(&flat, 640.0, 360.0).is_err());
    }
}
