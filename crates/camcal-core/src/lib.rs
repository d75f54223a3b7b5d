//! Geometry shared by the camcal detector and solvers.
//!
//! Corners with their grid labels, a borrowed grayscale view, planar
//! homographies, orientation clustering and the logging setup used by the
//! command-line tool. No camera or image-codec dependencies live here.

mod corner;
mod homography;
mod image;
mod logger;
mod orientation_clustering;

pub use corner::{Corner, GridCoords};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level_filter};
pub use orientation_clustering::{
    cluster_orientations, OrientationClusteringParams, OrientationClusteringResult,
};
