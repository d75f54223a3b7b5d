use camcal::{ChessPatternDetector, PatternDetector};
use image::{GrayImage, Luma};
use nalgebra::Point2;

const ROWS: usize = 6;
const COLS: usize = 9;
const SQUARE_PX: f64 = 40.0;

/// Board square coordinates (u across rows, v across cols) to pixels.
fn to_image(u: f64, v: f64) -> Point2<f64> {
    let (s, c) = 3f64.to_radians().sin_cos();
    let (x, y) = (v * SQUARE_PX, u * SQUARE_PX);
    Point2::new(110.0 + c * x - s * y, 90.0 + s * x + c * y)
}

fn to_board(p: Point2<f64>) -> (f64, f64) {
    let (s, c) = 3f64.to_radians().sin_cos();
    let (dx, dy) = (p.x - 110.0, p.y - 90.0);
    let x = c * dx + s * dy;
    let y = -s * dx + c * dy;
    (y / SQUARE_PX, x / SQUARE_PX)
}

fn render(width: u32, height: u32) -> GrayImage {
    let ss = 4;
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = 0.0;
        for sy in 0..ss {
            for sx in 0..ss {
                let px = x as f64 + (sx as f64 + 0.5) / ss as f64 - 0.5;
                let py = y as f64 + (sy as f64 + 0.5) / ss as f64 - 0.5;
                let (u, v) = to_board(Point2::new(px, py));
                let inside = u >= 0.0 && v >= 0.0 && u < (ROWS + 1) as f64 && v < (COLS + 1) as f64;
                let dark = inside && (u.floor() as i64 + v.floor() as i64) % 2 == 0;
                acc += if dark { 25.0 } else { 230.0 };
            }
        }
        Luma([(acc / (ss * ss) as f64).round() as u8])
    })
}

fn inner_corners() -> Vec<Point2<f32>> {
    (1..=COLS)
        .flat_map(|v| (1..=ROWS).map(move |u| (u, v)))
        .map(|(u, v)| to_image(u as f64, v as f64).cast::<f32>())
        .collect()
}

#[test]
fn finds_all_corners_of_a_rendered_board() {
    let img = render(640, 480);
    let detector = ChessPatternDetector::for_pattern(ROWS as u32, COLS as u32);
    let points = detector.detect(&img).expect("board detected");
    assert_eq!(points.len(), ROWS * COLS);

    for truth in inner_corners() {
        let nearest = points
            .iter()
            .map(|p| (p - truth).norm())
            .fold(f32::INFINITY, f32::min);
        assert!(nearest < 0.3, "corner {truth:?} off by {nearest}");
    }

    // The origin is the corner closest to the image's top-left.
    let origin = points[0];
    assert!(points
        .iter()
        .all(|p| origin.coords.norm_squared() <= p.coords.norm_squared()));
    // Consecutive corners along the first axis are one square apart.
    for pair in points[..ROWS].windows(2) {
        let step = (pair[1] - pair[0]).norm();
        assert!((step - SQUARE_PX as f32).abs() < 1.0, "step {step}");
    }
}

#[test]
fn partially_hidden_board_is_rejected() {
    let mut img = render(640, 480);
    // Paint over the right-most column of squares.
    for y in 0..480 {
        for x in 430..640 {
            img.put_pixel(x, y, Luma([230]));
        }
    }
    let detector = ChessPatternDetector::for_pattern(ROWS as u32, COLS as u32);
    assert!(detector.detect(&img).is_none());
}
