//! Sub-pixel corner refinement.
//!
//! At the true saddle point `q`, every image gradient `g(p)` inside a small
//! window is orthogonal to `p - q`. Summing `g gᵀ (p - q) = 0` over the window
//! gives a 2×2 linear system for `q`, which is re-solved with the window
//! re-centred until the update drops below `epsilon` or `max_iters` is hit.

use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half side of the search window; 5 gives an 11×11 window.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once a single update moves the corner less than this, in pixels.
    pub epsilon: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Refine every corner in place.
///
/// A corner whose estimate wanders further than the window from its start
/// keeps its initial position.
pub fn refine_corners(img: &GrayImageView<'_>, corners: &mut [Point2<f32>], params: &SubPixParams) {
    if params.half_window == 0 {
        return;
    }
    let mask = gaussian_mask(params.half_window);
    for c in corners.iter_mut() {
        *c = refine_one(img, *c, params, &mask);
    }
}

/// Separable weights `exp(-x² / w²)` for `x ∈ [-w, w]`.
fn gaussian_mask(half: usize) -> Vec<f64> {
    let w = half as f64;
    (-(half as i64)..=half as i64)
        .map(|x| (-(x * x) as f64 / (w * w)).exp())
        .collect()
}

fn refine_one(
    img: &GrayImageView<'_>,
    start: Point2<f32>,
    params: &SubPixParams,
    mask: &[f64],
) -> Point2<f32> {
    let half = params.half_window as i64;
    let eps_sq = (params.epsilon as f64).powi(2);
    let mut q = Vector2::new(start.x as f64, start.y as f64);

    for _ in 0..params.max_iters {
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();

        for dy in -half..=half {
            let wy = mask[(dy + half) as usize];
            for dx in -half..=half {
                let w = wy * mask[(dx + half) as usize];
                let px = q.x + dx as f64;
                let py = q.y + dy as f64;
                let gx = 0.5
                    * (sample_bilinear(img, (px + 1.0) as f32, py as f32)
                        - sample_bilinear(img, (px - 1.0) as f32, py as f32))
                        as f64;
                let gy = 0.5
                    * (sample_bilinear(img, px as f32, (py + 1.0) as f32)
                        - sample_bilinear(img, px as f32, (py - 1.0) as f32))
                        as f64;

                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 1)] += gyy;
                b.x += gxx * px + gxy * py;
                b.y += gxy * px + gyy * py;
            }
        }
        a[(1, 0)] = a[(0, 1)];

        let Some(next) = a.try_inverse().map(|inv| inv * b) else {
            break;
        };
        let step_sq = (next - q).norm_squared();
        q = next;
        if step_sq <= eps_sq {
            break;
        }
    }

    let moved = Vector2::new(q.x - start.x as f64, q.y - start.y as f64);
    let limit = half as f64;
    if !q.x.is_finite() || !q.y.is_finite() || moved.x.abs() > limit || moved.y.abs() > limit {
        return start;
    }
    Point2::new(q.x as f32, q.y as f32)
}
