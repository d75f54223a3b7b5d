use camcal_chessboard::{ChessboardDetector, ChessboardParams};
use camcal_core::{Corner, GrayImageView, Homography};
use nalgebra::{Matrix3, Point2};
use std::f32::consts::FRAC_PI_4;

const ROWS: usize = 6;
const COLS: usize = 9;

/// Board squares (u, v) -> image pixels, slightly rotated with mild perspective.
fn board_to_image() -> Homography {
    let (s, c) = 5f64.to_radians().sin_cos();
    Homography::new(Matrix3::new(
        30.0 * c,
        -30.0 * s,
        60.0, //
        30.0 * s,
        30.0 * c,
        50.0, //
        1.0e-4,
        2.0e-4,
        1.0,
    ))
}

/// Inner corners in pattern order: u fastest, both starting at 1.
fn ground_truth(h: &Homography) -> Vec<Point2<f32>> {
    (1..=COLS)
        .flat_map(|v| (1..=ROWS).map(move |u| (u, v)))
        .map(|(u, v)| {
            let p = h.apply(Point2::new(u as f64, v as f64));
            Point2::new(p.x as f32, p.y as f32)
        })
        .collect()
}

fn render(h: &Homography, width: usize, height: usize) -> Vec<u8> {
    let inv = h.inverse().expect("invertible");
    let ss = 4;
    let mut data = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for sy in 0..ss {
                for sx in 0..ss {
                    let px = x as f64 + (sx as f64 + 0.5) / ss as f64 - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) / ss as f64 - 0.5;
                    let b = inv.apply(Point2::new(px, py));
                    let inside =
                        b.x >= 0.0 && b.y >= 0.0 && b.x < (ROWS + 1) as f64 && b.y < (COLS + 1) as f64;
                    let dark = inside && (b.x.floor() as i64 + b.y.floor() as i64) % 2 == 1;
                    acc += if dark { 20.0 } else { 235.0 };
                }
            }
            data[y * width + x] = (acc / (ss * ss) as f64).round() as u8;
        }
    }
    data
}

fn synthetic_corners(truth: &[Point2<f32>], jitter: f32) -> Vec<Corner> {
    truth
        .iter()
        .enumerate()
        .map(|(k, p)| {
            let (u, v) = (k % ROWS, k / ROWS);
            let orientation = if (u + v) % 2 == 0 {
                FRAC_PI_4
            } else {
                3.0 * FRAC_PI_4
            };
            // Deterministic pseudo-noise in [-jitter, jitter].
            let nx = (((k * 7919) % 13) as f32 / 6.0 - 1.0) * jitter;
            let ny = (((k * 104729) % 11) as f32 / 5.0 - 1.0) * jitter;
            Corner::new(Point2::new(p.x + nx, p.y + ny), orientation, 1.0)
        })
        .collect()
}

#[test]
fn detects_and_orders_perspective_board_with_clutter() {
    let h = board_to_image();
    let truth = ground_truth(&h);
    let mut corners = synthetic_corners(&truth, 0.5);

    // Isolated clutter far from the board and a weak spurious corner.
    corners.push(Corner::new(Point2::new(600.0, 30.0), 0.2, 1.0));
    corners.push(Corner::new(Point2::new(640.0, 400.0), 1.4, 1.0));
    corners.push(Corner::new(Point2::new(120.0, 130.0), FRAC_PI_4, 0.001));

    let params = ChessboardParams {
        min_strength: 0.1,
        ..ChessboardParams::with_pattern(ROWS as u32, COLS as u32)
    };
    let points = ChessboardDetector::new(params)
        .detect_from_corners(&corners)
        .expect("board detected");

    assert_eq!(points.len(), ROWS * COLS);
    for (got, want) in points.iter().zip(&truth) {
        assert!((got - want).norm() < 1.0, "{got:?} vs {want:?}");
    }
}

#[test]
fn refines_rendered_board_to_subpixel_accuracy() {
    let (width, height) = (300, 420);
    let h = board_to_image();
    let truth = ground_truth(&h);
    let data = render(&h, width, height);
    let view = GrayImageView::new(width, height, &data).expect("view");

    let corners = synthetic_corners(&truth, 0.8);
    let detector = ChessboardDetector::new(ChessboardParams::with_pattern(ROWS as u32, COLS as u32));
    let points = detector
        .detect_and_refine(&view, &corners)
        .expect("board detected");

    let max_err = points
        .iter()
        .zip(&truth)
        .map(|(a, b)| (a - b).norm())
        .fold(0.0f32, f32::max);
    assert!(max_err < 0.1, "max refinement error {max_err}");
}

#[test]
fn two_complete_boards_are_ambiguous() {
    let h = board_to_image();
    let truth = ground_truth(&h);
    let mut corners = synthetic_corners(&truth, 0.0);
    let shifted: Vec<Point2<f32>> = truth.iter().map(|p| Point2::new(p.x + 400.0, p.y)).collect();
    corners.extend(synthetic_corners(&shifted, 0.0));

    let detector = ChessboardDetector::new(ChessboardParams::with_pattern(ROWS as u32, COLS as u32));
    assert!(detector.detect_from_corners(&corners).is_none());
}
