//! Two-family clustering of corner orientations on the circle of period π.
//!
//! Every inner corner of a checkerboard carries one of two diagonal
//! orientations, roughly 90° apart. The clustering finds both families and
//! labels each corner with 0, 1 or `None` (outlier). Purely angular; no
//! geometry happens here.

use crate::Corner;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Parameters for orientation clustering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationClusteringParams {
    /// Number of histogram bins on [0, π).
    pub num_bins: usize,
    /// Max circular 2-means iterations.
    pub max_iters: usize,
    /// Minimal separation between the two seed peaks, in degrees.
    pub peak_min_separation_deg: f32,
    /// Corners further than this from both centers are outliers, in degrees.
    pub outlier_threshold_deg: f32,
    /// Minimal smoothed histogram mass of a seed peak, as a fraction of the total.
    pub min_peak_weight_fraction: f32,
    /// Weight each corner by its detector response.
    pub use_weights: bool,
}

impl Default for OrientationClusteringParams {
    fn default() -> Self {
        Self {
            num_bins: 90,
            max_iters: 10,
            peak_min_separation_deg: 10.0,
            outlier_threshold_deg: 30.0,
            min_peak_weight_fraction: 0.05,
            use_weights: true,
        }
    }
}

/// Result of orientation clustering.
#[derive(Clone, Debug)]
pub struct OrientationClusteringResult {
    /// Cluster centers in [0, π).
    pub centers: [f32; 2],
    /// Per-corner label, parallel to the input slice.
    pub labels: Vec<Option<usize>>,
    /// Sum of weights in each cluster, outliers excluded.
    pub cluster_weights: [f32; 2],
}

/// Cluster corner orientations into two dominant directions on [0, π).
///
/// Returns `None` when fewer than two separated modes exist.
pub fn cluster_orientations(
    corners: &[Corner],
    params: &OrientationClusteringParams,
) -> Option<OrientationClusteringResult> {
    if corners.is_empty() || params.num_bins < 4 {
        return None;
    }

    let weight = |c: &Corner| {
        if params.use_weights {
            c.strength.max(0.0)
        } else {
            1.0
        }
    };

    let mut hist = vec![0.0f32; params.num_bins];
    let mut total_weight = 0.0f32;
    for c in corners {
        let w = weight(c);
        hist[angle_to_bin(c.orientation, params.num_bins)] += w;
        total_weight += w;
    }
    if total_weight <= 0.0 {
        return None;
    }

    let smoothed = smooth_circular_histogram(&hist);
    let mut peaks = find_peaks(&smoothed);
    let min_peak_weight = total_weight * params.min_peak_weight_fraction;
    peaks.retain(|p| p.value >= min_peak_weight);
    peaks.sort_by(|a, b| b.value.total_cmp(&a.value));

    let first = bin_to_angle(peaks.first()?.bin, params.num_bins);
    let min_sep = params.peak_min_separation_deg.to_radians();
    let second = peaks[1..]
        .iter()
        .map(|p| bin_to_angle(p.bin, params.num_bins))
        .find(|&cand| angular_dist_pi(first, cand) >= min_sep)?;

    let mut centers = [first, second];
    let outlier_threshold = params.outlier_threshold_deg.to_radians();
    let mut labels: Vec<Option<usize>> = vec![None; corners.len()];

    for _ in 0..params.max_iters {
        let mut changed = false;
        for (label, c) in labels.iter_mut().zip(corners) {
            let t = wrap_angle_pi(c.orientation);
            let d0 = angular_dist_pi(t, centers[0]);
            let d1 = angular_dist_pi(t, centers[1]);
            let (best, dist) = if d0 <= d1 { (0, d0) } else { (1, d1) };
            let new_label = (dist <= outlier_threshold).then_some(best);
            if *label != new_label {
                *label = new_label;
                changed = true;
            }
        }

        // Circular mean on the doubled angle so that θ and θ+π coincide.
        let mut sum = [[0.0f32; 2]; 2];
        for (label, c) in labels.iter().zip(corners) {
            if let Some(k) = *label {
                let w = weight(c);
                let t2 = 2.0 * wrap_angle_pi(c.orientation);
                sum[k][0] += w * t2.cos();
                sum[k][1] += w * t2.sin();
            }
        }
        for k in 0..2 {
            if sum[k][0] != 0.0 || sum[k][1] != 0.0 {
                centers[k] = wrap_angle_pi(0.5 * sum[k][1].atan2(sum[k][0]));
            }
        }

        if !changed {
            break;
        }
    }

    let mut cluster_weights = [0.0f32; 2];
    for (label, c) in labels.iter().zip(corners) {
        if let Some(k) = *label {
            cluster_weights[k] += weight(c);
        }
    }

    Some(OrientationClusteringResult {
        centers,
        labels,
        cluster_weights,
    })
}

/// Wrap an angle to [0, π).
pub(crate) fn wrap_angle_pi(theta: f32) -> f32 {
    let t = theta.rem_euclid(PI);
    if t >= PI {
        0.0
    } else {
        t
    }
}

/// Smallest angular distance with period π, in [0, π/2].
pub(crate) fn angular_dist_pi(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(PI);
    if d > FRAC_PI_2 {
        PI - d
    } else {
        d
    }
}

fn angle_to_bin(theta: f32, num_bins: usize) -> usize {
    let x = wrap_angle_pi(theta) / PI * num_bins as f32;
    (x.floor() as usize).min(num_bins - 1)
}

/// Center of a bin.
fn bin_to_angle(bin: usize, num_bins: usize) -> f32 {
    (bin as f32 + 0.5) * PI / num_bins as f32
}

/// Circular convolution with a [1, 4, 6, 4, 1] / 16 kernel.
fn smooth_circular_histogram(hist: &[f32]) -> Vec<f32> {
    const K: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    let n = hist.len() as isize;
    (0..n)
        .map(|i| {
            K.iter()
                .enumerate()
                .map(|(k, &w)| w * hist[(i + k as isize - 2).rem_euclid(n) as usize])
                .sum::<f32>()
                / 16.0
        })
        .collect()
}

#[derive(Clone, Debug)]
struct Peak {
    bin: usize,
    value: f32,
}

/// Local maxima on a circular 1D array.
fn find_peaks(hist: &[f32]) -> Vec<Peak> {
    let n = hist.len();
    (0..n)
        .filter_map(|i| {
            let prev = hist[(i + n - 1) % n];
            let curr = hist[i];
            let next = hist[(i + 1) % n];
            (curr > 0.0 && curr >= prev && curr > next).then_some(Peak {
                bin: i,
                value: curr,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn corner(deg: f32) -> Corner {
        Corner::new(Point2::new(0.0, 0.0), deg.to_radians(), 1.0)
    }

    #[test]
    fn finds_two_families_and_flags_outliers() {
        let mut corners = Vec::new();
        for k in 0..20 {
            let jitter = (k % 5) as f32 - 2.0;
            corners.push(corner(40.0 + jitter));
            corners.push(corner(130.0 + jitter));
        }
        corners.push(corner(85.0));

        let res = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("two clusters");

        let mut centers_deg = res.centers.map(|c| c.to_degrees());
        centers_deg.sort_by(f32::total_cmp);
        assert!((centers_deg[0] - 40.0).abs() < 2.0, "{centers_deg:?}");
        assert!((centers_deg[1] - 130.0).abs() < 2.0, "{centers_deg:?}");

        assert_ne!(res.labels[0], res.labels[1]);
        assert_eq!(res.labels[0], res.labels[2]);
        assert_eq!(*res.labels.last().unwrap(), None);
        assert!((res.cluster_weights[0] - 20.0).abs() < 1e-3);
    }

    #[test]
    fn wraps_across_zero() {
        let corners: Vec<_> = [178.0, 179.0, 1.0, 2.0, 88.0, 89.0, 91.0, 92.0]
            .into_iter()
            .map(corner)
            .collect();
        let res = cluster_orientations(&corners, &OrientationClusteringParams::default())
            .expect("two clusters");
        assert_eq!(res.labels[0], res.labels[3]);
        assert_eq!(res.labels[4], res.labels[7]);
        assert_ne!(res.labels[0], res.labels[4]);
    }

    #[test]
    fn single_mode_is_rejected() {
        let corners: Vec<_> = (0..10).map(|_| corner(45.0)).collect();
        assert!(cluster_orientations(&corners, &OrientationClusteringParams::default()).is_none());
    }

    #[test]
    fn angular_distance_is_periodic() {
        assert!((angular_dist_pi(0.01, PI - 0.01) - 0.02).abs() < 1e-5);
        assert!((angular_dist_pi(0.0, FRAC_PI_2) - FRAC_PI_2).abs() < 1e-5);
    }
}
