//! Console report: bracketed numeric blocks like the ones users already know
//! from array printouts.

use crate::solver::Intrinsics;
use camcal_solve::Pose;
use nalgebra::storage::Storage;
use nalgebra::{Dim, Matrix, RowVector5};
use std::fmt::Write as _;
use std::path::Path;

/// Render a matrix as `[[a b]\n [c d]]`, columns right-aligned.
pub fn format_matrix<R: Dim, C: Dim, S: Storage<f64, R, C>>(m: &Matrix<f64, R, C, S>) -> String {
    let cells: Vec<Vec<String>> = (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| format!("{:.8}", m[(i, j)])).collect())
        .collect();
    let width = cells.iter().flatten().map(String::len).max().unwrap_or(0);

    let mut out = String::from("[");
    for (i, row) in cells.iter().enumerate() {
        if i > 0 {
            out.push_str("\n ");
        }
        out.push('[');
        let padded: Vec<String> = row.iter().map(|c| format!("{c:>width$}")).collect();
        out.push_str(&padded.join(" "));
        out.push(']');
    }
    out.push(']');
    out
}

pub fn captured(count: usize) -> String {
    format!("Captured calibration image #{count}")
}

pub fn calibration(intrinsics: &Intrinsics) -> String {
    let d = RowVector5::from_row_slice(&intrinsics.distortion.to_array());
    let mut s = String::new();
    let _ = writeln!(s, "Final Camera matrix:\n{}", format_matrix(&intrinsics.camera_matrix));
    let _ = writeln!(s, "Distortion coefficients:\n{}", format_matrix(&d));
    let _ = write!(s, "RMS reprojection error: {:.6} px", intrinsics.rms);
    s
}

pub fn pose(pose: &Pose) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Rotation vector:\n{}", format_matrix(&pose.rvec));
    let _ = writeln!(s, "Translation vector:\n{}", format_matrix(&pose.tvec));
    let _ = write!(s, "Extrinsic matrix [R|t]:\n{}", format_matrix(&pose.pose_matrix()));
    s
}

pub fn saved(path: &Path) -> String {
    format!("Saved extrinsic image as {}", path.display())
}
