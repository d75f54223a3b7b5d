//! Planar homographies from point correspondences.

use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};

/// Planar projective map `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Similarity moving a point set to its centroid with mean radius sqrt(2).
struct Conditioner {
    t: Matrix3<f64>,
    points: Vec<Point2<f64>>,
}

impl Conditioner {
    fn fit(pts: &[Point2<f64>]) -> Self {
        let n = pts.len() as f64;
        let centroid = pts.iter().fold(Vector3::zeros(), |acc, p| {
            acc + Vector3::new(p.x, p.y, 0.0)
        }) / n;
        let radius = pts
            .iter()
            .map(|p| (p.x - centroid.x).hypot(p.y - centroid.y))
            .sum::<f64>()
            / n;
        let s = if radius > 1e-12 {
            std::f64::consts::SQRT_2 / radius
        } else {
            1.0
        };

        let t = Matrix3::new(
            s, 0.0, -s * centroid.x, //
            0.0, s, -s * centroid.y, //
            0.0, 0.0, 1.0,
        );
        let points = pts
            .iter()
            .map(|p| Point2::new(s * (p.x - centroid.x), s * (p.y - centroid.y)))
            .collect();
        Self { t, points }
    }
}

/// Undo conditioning on both sides and fix the scale so `H[2][2] == 1`.
fn uncondition(hn: Matrix3<f64>, src: &Conditioner, dst: &Conditioner) -> Option<Homography> {
    let h = dst.t.try_inverse()? * hn * src.t;
    let w = h[(2, 2)];
    if w.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / w))
}

/// The two DLT rows for `(x, y) -> (u, v)` over `[h11 .. h33]`.
fn dlt_rows(s: Point2<f64>, d: Point2<f64>) -> [[f64; 9]; 2] {
    let (x, y, u, v) = (s.x, s.y, d.x, d.y);
    [
        [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u],
        [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v],
    ]
}

/// Estimate H such that `dst ~ H * src` with the normalized DLT.
///
/// Returns `None` for mismatched inputs, fewer than four correspondences or a
/// degenerate configuration.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);

    let hn = if src.len() == 4 {
        // The thin SVD of an 8x9 system drops the null vector; solve exactly.
        solve_minimal(&cs.points, &cd.points)?
    } else {
        solve_null_space(&cs.points, &cd.points)?
    };
    uncondition(hn, &cs, &cd)
}

fn solve_null_space(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        for (r, row) in dlt_rows(*s, *d).iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                a[(2 * k + r, c)] = *value;
            }
        }
    }

    let vt = a.svd(false, true).v_t?;
    let h = vt.row(vt.nrows().checked_sub(1)?);
    Some(Matrix3::from_iterator(h.iter().copied()).transpose())
}

/// Exact solve with `h33` pinned to one.
fn solve_minimal(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        for (r, row) in dlt_rows(*s, *d).iter().enumerate() {
            for c in 0..8 {
                a[(2 * k + r, c)] = row[c];
            }
            b[2 * k + r] = -row[8];
        }
    }

    let x = a.lu().solve(&b)?;
    Some(Matrix3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            120.0, 8.0, 310.0, //
            -5.0, 115.0, 240.0, //
            0.02, -0.01, 1.0,
        ))
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = ground_truth();
        let inv = h.inverse().expect("invertible");
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(2.5, -1.0),
            Point2::new(3.0, 1.75),
        ] {
            let back = inv.apply(h.apply(p));
            assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-9);
            assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn four_points_recover_h() {
        let gt = ground_truth();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(3.5, 0.0),
            Point2::new(3.5, 2.2),
            Point2::new(0.0, 2.2),
        ];
        let dst: Vec<_> = src.iter().map(|&p| gt.apply(p)).collect();
        let est = estimate_homography(&src, &dst).expect("estimate");
        for p in [Point2::new(1.0, 1.0), Point2::new(3.0, 0.5)] {
            let a = est.apply(p);
            let b = gt.apply(p);
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-6);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn dlt_handles_overdetermined_case() {
        let gt = ground_truth();
        let src: Vec<Point2<f64>> = (0..6)
            .flat_map(|r| (0..9).map(move |c| Point2::new(r as f64 * 0.4375, c as f64 * 0.4375)))
            .collect();
        let dst: Vec<_> = src.iter().map(|&p| gt.apply(p)).collect();

        let est = estimate_homography(&src, &dst).expect("estimate");
        assert_abs_diff_eq!(est.h[(2, 2)], 1.0, epsilon = 1e-12);
        for (s, d) in src.iter().zip(&dst) {
            let p = est.apply(*s);
            assert_abs_diff_eq!(p.x, d.x, epsilon = 1e-6);
            assert_abs_diff_eq!(p.y, d.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn mismatched_input_lengths_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
        assert!(estimate_homography(&src[..3], &dst).is_none());
    }
}
