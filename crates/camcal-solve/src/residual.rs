//! Reprojection residual generic over the scalar type.
//!
//! Evaluated with `f64` for the cost and with `num-dual` dual numbers for the
//! Jacobian, so both always describe the same model.

use nalgebra::{Point2, Point3, RealField, Vector3};

/// Camera block `fx fy cx cy k1 k2 p1 p2 k3`.
pub(crate) const CAMERA_DIM: usize = 9;
/// Pose block `rvec tvec`.
pub(crate) const POSE_DIM: usize = 6;

#[inline]
fn lift<T: RealField>(v: f64) -> T {
    nalgebra::convert(v)
}

/// Rotate `p` by the axis-angle vector `r` (Rodrigues).
fn rotate<T: RealField>(r: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = r.norm_squared();
    let rxp = r.cross(p);
    if theta2 < lift(1e-16) {
        // Second-order expansion; keeps derivatives defined at r = 0.
        return p.clone() + rxp.clone() + r.cross(&rxp) * lift::<T>(0.5);
    }
    let theta = theta2.clone().sqrt();
    let (s, c) = theta.clone().sin_cos();
    let a = s / theta;
    let b = (T::one() - c.clone()) / theta2;
    p.clone() * c + rxp * a + r.clone() * (r.dot(p) * b)
}

/// Predicted minus observed pixel for one board point.
///
/// `camera` holds [`CAMERA_DIM`] values and `pose` holds [`POSE_DIM`].
pub(crate) fn reprojection_residual<T: RealField>(
    camera: &[T],
    pose: &[T],
    object: &Point3<f64>,
    observed: &Point2<f64>,
) -> [T; 2] {
    debug_assert!(camera.len() >= CAMERA_DIM && pose.len() >= POSE_DIM);
    let [fx, fy, cx, cy, k1, k2, p1, p2, k3] = [
        camera[0].clone(),
        camera[1].clone(),
        camera[2].clone(),
        camera[3].clone(),
        camera[4].clone(),
        camera[5].clone(),
        camera[6].clone(),
        camera[7].clone(),
        camera[8].clone(),
    ];
    let r = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
    let t = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());

    let pw = Vector3::new(lift(object.x), lift(object.y), lift(object.z));
    let pc = rotate(&r, &pw) + t;

    let eps: T = lift(1e-12);
    let z = if pc.z > eps { pc.z.clone() } else { eps };
    let x = pc.x.clone() / z.clone();
    let y = pc.y.clone() / z;

    let two: T = lift(2.0);
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let radial = T::one() + r2.clone() * (k1 + r2.clone() * (k2 + r2.clone() * k3));
    let xy2 = two.clone() * x.clone() * y.clone();
    let xd = x.clone() * radial.clone()
        + p1.clone() * xy2.clone()
        + p2.clone() * (r2.clone() + two.clone() * x.clone() * x);
    let yd = y.clone() * radial + p1 * (r2 + two * y.clone() * y) + p2 * xy2;

    [
        fx * xd + cx - lift(observed.x),
        fy * yd + cy - lift(observed.y),
    ]
}
