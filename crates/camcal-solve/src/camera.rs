use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::pose::Pose;

/// Pinhole intrinsics with zero skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }

    /// Pixel to normalized image plane, no distortion handling.
    pub fn normalize(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    pub fn denormalize(&self, n: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

/// Brown-Conrady lens distortion, coefficients in `(k1, k2, p1, p2, k3)` order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn from_array(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply distortion to a point on the normalized image plane.
    pub fn distort(&self, n: Point2<f64>) -> Point2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xy2 = 2.0 * x * y;
        Point2::new(
            x * radial + self.p1 * xy2 + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + self.p2 * xy2,
        )
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: Point2<f64>, iters: usize) -> Point2<f64> {
        let mut x = d.x;
        let mut y = d.y;
        for _ in 0..iters {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let xy2 = 2.0 * x * y;
            let dx = self.p1 * xy2 + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + self.p2 * xy2;
            x = (d.x - dx) / radial;
            y = (d.y - dy) / radial;
        }
        Point2::new(x, y)
    }
}

/// Project a board point through `pose`, distortion and intrinsics into pixels.
pub fn project_point(
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    pose: &Pose,
    p: &Point3<f64>,
) -> Point2<f64> {
    let pc = pose.transform_point(p);
    let n = Point2::new(pc.x / pc.z, pc.y / pc.z);
    intrinsics.denormalize(distortion.distort(n))
}
