use nalgebra::{Matrix3, Matrix3x4, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform from board coordinates into the camera frame.
///
/// Rotation is stored as an axis-angle (Rodrigues) vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation(rotation: &Rotation3<f64>, tvec: Vector3<f64>) -> Self {
        Self {
            rvec: rotation.scaled_axis(),
            tvec,
        }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(self.rvec)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation().into_inner()
    }

    /// The 3×4 extrinsic matrix `[R | t]`.
    pub fn pose_matrix(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.set_column(3, &self.tvec);
        m
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation() * p + self.tvec
    }

    pub(crate) fn to_params(self) -> [f64; 6] {
        [
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z,
        ]
    }

    pub(crate) fn from_params(p: &[f64]) -> Self {
        Self {
            rvec: Vector3::new(p[0], p[1], p[2]),
            tvec: Vector3::new(p[3], p[4], p[5]),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.tvec.iter()).all(|v| v.is_finite())
    }
}
