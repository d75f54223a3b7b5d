use camcal_core::OrientationClusteringParams;
use serde::{Deserialize, Serialize};

use crate::subpix::SubPixParams;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    /// Max angle between an edge and the nearest grid axis.
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 200.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Inner corners along the first board axis (the fastest-varying index).
    pub rows: u32,

    /// Inner corners along the second board axis.
    pub cols: u32,

    /// Minimal corner strength to consider.
    pub min_strength: f32,

    pub orientation_clustering: OrientationClusteringParams,
    pub grid: GridGraphParams,
    pub subpix: SubPixParams,
}

impl ChessboardParams {
    pub fn with_pattern(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    pub fn num_corners(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            rows: 6,
            cols: 9,
            min_strength: 0.0,
            orientation_clustering: OrientationClusteringParams::default(),
            grid: GridGraphParams::default(),
            subpix: SubPixParams::default(),
        }
    }
}
