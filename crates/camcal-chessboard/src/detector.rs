use crate::geom::{cross, dist_to_origin_sq, grid_axes_from_diagonals};
use crate::gridgraph::GridGraph;
use crate::params::ChessboardParams;
use crate::subpix::refine_corners;
use camcal_core::{cluster_orientations, Corner, GrayImageView, GridCoords};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Checkerboard detector over a cloud of ChESS corners.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Find the full `rows × cols` board and return its corners in pattern
    /// order (first axis fastest).
    ///
    /// Returns `None` unless every inner corner of exactly one complete board
    /// is recovered.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, corners), fields(num_corners = corners.len()))
    )]
    pub fn detect_from_corners(&self, corners: &[Corner]) -> Option<Vec<Point2<f32>>> {
        let rows = self.params.rows as usize;
        let cols = self.params.cols as usize;
        if rows < 2 || cols < 2 {
            return None;
        }

        let mut strong: Vec<Corner> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_strength)
            .cloned()
            .collect();
        if strong.len() < rows * cols {
            debug!(
                "{} corners after strength filter, need {}",
                strong.len(),
                rows * cols
            );
            return None;
        }

        let Some(clusters) = cluster_orientations(&strong, &self.params.orientation_clustering)
        else {
            debug!("orientation clustering found no two diagonal families");
            return None;
        };
        for (c, label) in strong.iter_mut().zip(&clusters.labels) {
            c.orientation_cluster = *label;
        }
        let axes = grid_axes_from_diagonals(clusters.centers)?;

        let graph = GridGraph::new(&strong, &self.params.grid, axes);
        let mut found = None;
        for component in graph.connected_components() {
            if component.len() != rows * cols {
                continue;
            }
            let Some(coords) = graph.assign_grid_coordinates(&component) else {
                debug!("component of {} corners has conflicting coordinates", component.len());
                continue;
            };
            if let Some(ordered) = order_board(&strong, &coords, rows, cols) {
                if found.is_some() {
                    debug!("more than one complete board in view");
                    return None;
                }
                found = Some(ordered);
            }
        }

        if found.is_none() {
            debug!("no complete {rows}x{cols} component");
        }
        found
    }

    /// Full detection followed by sub-pixel refinement on `img`.
    pub fn detect_and_refine(
        &self,
        img: &GrayImageView<'_>,
        corners: &[Corner],
    ) -> Option<Vec<Point2<f32>>> {
        let mut points = self.detect_from_corners(corners)?;
        refine_corners(img, &mut points, &self.params.subpix);
        Some(points)
    }
}

/// Map BFS coordinates to pattern order with a canonical orientation.
///
/// Among the grid symmetries that fit `rows × cols`, keep those whose board
/// frame is right-handed on screen and pick the one whose origin corner is
/// closest to the image's top-left.
fn order_board(
    corners: &[Corner],
    coords: &[(usize, GridCoords)],
    rows: usize,
    cols: usize,
) -> Option<Vec<Point2<f32>>> {
    let width = coords.iter().map(|(_, g)| g.i).max()? as usize + 1;
    let height = coords.iter().map(|(_, g)| g.j).max()? as usize + 1;
    if width * height != rows * cols || coords.len() != rows * cols {
        return None;
    }

    let mut grid = vec![None; width * height];
    for &(idx, g) in coords {
        grid[g.j as usize * width + g.i as usize] = Some(corners[idx].position);
    }
    let grid: Vec<Point2<f32>> = grid.into_iter().collect::<Option<_>>()?;
    let at = |i: usize, j: usize| grid[j * width + i];

    let mut best: Option<(f32, Vec<Point2<f32>>)> = None;
    for transpose in [false, true] {
        let (w, h) = if transpose { (height, width) } else { (width, height) };
        if (w, h) != (rows, cols) {
            continue;
        }
        for flip_x in [false, true] {
            for flip_y in [false, true] {
                // Pattern (x, y) -> BFS cell.
                let cell = |x: usize, y: usize| {
                    let x = if flip_x { w - 1 - x } else { x };
                    let y = if flip_y { h - 1 - y } else { y };
                    if transpose {
                        at(y, x)
                    } else {
                        at(x, y)
                    }
                };

                let origin = cell(0, 0);
                let x_axis = cell(w - 1, 0) - origin;
                let y_axis = cell(0, h - 1) - origin;
                if cross(x_axis, y_axis) <= 0.0 {
                    continue;
                }

                let score = dist_to_origin_sq(origin);
                if best.as_ref().is_some_and(|(s, _)| *s <= score) {
                    continue;
                }
                let ordered = (0..h)
                    .flat_map(|y| (0..w).map(move |x| (x, y)))
                    .map(|(x, y)| cell(x, y))
                    .collect();
                best = Some((score, ordered));
            }
        }
    }

    best.map(|(_, ordered)| ordered)
}
