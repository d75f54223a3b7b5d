//! Preview annotation with `imageproc`.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use nalgebra::Point2;

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 200, 255]),
    Rgb([180, 0, 255]),
];

const RADIUS: i32 = 5;

/// Copy of `frame` with the detected board drawn on top: one colour per
/// line of `line_len` consecutive corners, a circle at every corner and a
/// polyline through them in pattern order.
pub fn annotate(frame: &RgbImage, corners: &[Point2<f32>], line_len: usize) -> RgbImage {
    let mut out = frame.clone();
    let line_len = line_len.max(1);
    let color = |k: usize| PALETTE[(k / line_len) % PALETTE.len()];

    for (k, pair) in corners.windows(2).enumerate() {
        draw_line_segment_mut(
            &mut out,
            (pair[0].x, pair[0].y),
            (pair[1].x, pair[1].y),
            color(k + 1),
        );
    }
    for (k, p) in corners.iter().enumerate() {
        let center = (p.x.round() as i32, p.y.round() as i32);
        draw_hollow_circle_mut(&mut out, center, RADIUS, color(k));
        draw_hollow_circle_mut(&mut out, center, RADIUS - 1, color(k));
    }
    out
}
