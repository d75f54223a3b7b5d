//! Checkerboard detection on `image::GrayImage` frames.
//!
//! The controller only sees the [`PatternDetector`] trait. The concrete
//! [`ChessPatternDetector`] runs the ChESS corner detector from
//! `chess-corners`, the grid detector from `camcal-chessboard` and finally
//! sub-pixel refinement.

use camcal_chessboard::{ChessboardDetector, ChessboardParams};
use camcal_core::{Corner, GrayImageView};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use image::GrayImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Locates the checkerboard in a grayscale frame.
pub trait PatternDetector {
    /// Ordered, refined corners of the full board, or `None` when the board
    /// is not completely visible.
    fn detect(&self, gray: &GrayImage) -> Option<Vec<Point2<f32>>>;
}

/// Tunables of the ChESS corner detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessCornerParams {
    /// Response threshold relative to the strongest corner in the frame.
    pub threshold_rel: f32,
    pub nms_radius: u32,
}

impl Default for ChessCornerParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

impl ChessCornerParams {
    pub fn to_chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = self.threshold_rel as _;
        cfg.params.nms_radius = self.nms_radius as _;
        cfg
    }
}

/// Reasonable default settings for the ChESS detector on webcam frames.
pub fn default_chess_config() -> ChessConfig {
    ChessCornerParams::default().to_chess_config()
}

/// Borrow an `image::GrayImage` as the lightweight `camcal-core` view type.
pub fn gray_view(img: &GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Detect raw ChESS corners and adapt them into `camcal-core::Corner`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &GrayImage, cfg: &ChessConfig) -> Vec<Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner::new(Point2::new(c.x, c.y), c.orientation, c.response)
}

/// ChESS corners, grid detection and sub-pixel refinement.
#[derive(Clone, Debug)]
pub struct ChessPatternDetector {
    corners: ChessCornerParams,
    board: ChessboardDetector,
}

impl ChessPatternDetector {
    pub fn new(corners: &ChessCornerParams, board: ChessboardParams) -> Self {
        Self {
            corners: corners.clone(),
            board: ChessboardDetector::new(board),
        }
    }

    /// Default detector for a `rows × cols` inner-corner board.
    pub fn for_pattern(rows: u32, cols: u32) -> Self {
        Self::new(
            &ChessCornerParams::default(),
            ChessboardParams::with_pattern(rows, cols),
        )
    }

    pub fn corner_params(&self) -> &ChessCornerParams {
        &self.corners
    }

    pub fn board_params(&self) -> &ChessboardParams {
        &self.board.params
    }
}

impl PatternDetector for ChessPatternDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = gray.width(), height = gray.height()))
    )]
    fn detect(&self, gray: &GrayImage) -> Option<Vec<Point2<f32>>> {
        let corners = detect_corners(gray, &self.corners.to_chess_config());
        self.board.detect_and_refine(&gray_view(gray), &corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chess_params_parse_with_defaults() {
        let p: ChessCornerParams = serde_json::from_str(r#"{ "nms_radius": 3 }"#).unwrap();
        assert_eq!(p.nms_radius, 3);
        assert_eq!(p.threshold_rel, 0.2);
    }

    #[test]
    fn blank_frame_has_no_board() {
        let img = GrayImage::from_pixel(160, 120, image::Luma([128]));
        assert!(ChessPatternDetector::for_pattern(6, 9).detect(&img).is_none());
    }

    #[test]
    fn gray_view_borrows_buffer() {
        let img = GrayImage::from_fn(4, 3, |x, y| image::Luma([(x + 4 * y) as u8]));
        let view = gray_view(&img);
        assert_eq!((view.width, view.height), (4, 3));
        assert_eq!(view.data[5], 5);
    }
}
