//! Checkerboard detector built on top of `camcal-core`.
//!
//! ## Quickstart
//!
//! ```
//! use camcal_chessboard::{ChessboardDetector, ChessboardParams};
//! use camcal_core::Corner;
//!
//! let detector = ChessboardDetector::new(ChessboardParams::with_pattern(6, 9));
//!
//! let corners: Vec<Corner> = Vec::new();
//! let result = detector.detect_from_corners(&corners);
//! assert!(result.is_none());
//! ```
//!
//! Algorithm (graph-based, perspective-tolerant):
//! 1. Filter strong ChESS corners.
//! 2. Cluster corner orientations into the two diagonal families and derive
//!    the two global grid axes from the cluster centers.
//! 3. For each corner, query a k-d tree for nearby corners and keep at most
//!    one neighbor per axis direction (distance window, opposite family,
//!    edge aligned with an axis).
//! 4. Keep mutual edges only and split the graph into connected components.
//! 5. BFS each component and assign integer coordinates, rejecting
//!    components where two corners claim the same cell.
//! 6. Accept the single component that fills exactly `rows × cols` cells and
//!    order it canonically (right-handed on screen, origin nearest the
//!    image's top-left, first axis fastest).
//! 7. Optionally refine the ordered corners to sub-pixel accuracy.

mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use detector::ChessboardDetector;
pub use gridgraph::{GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams};
pub use subpix::{refine_corners, SubPixParams};
