use nalgebra::{Point2, Vector2};

/// Convert angle (radians) to unit 2D vector.
pub fn angle_to_unit(theta: f32) -> Vector2<f32> {
    Vector2::new(theta.cos(), theta.sin())
}

/// Global grid axes from the two diagonal cluster centers.
///
/// With light-square diagonals `o0`, `o1` the board edges run along
/// `o0 + o1` and `o0 - o1`. Returns `None` when the centers coincide.
pub fn grid_axes_from_diagonals(centers: [f32; 2]) -> Option<[Vector2<f32>; 2]> {
    let o0 = angle_to_unit(centers[0]);
    let o1 = angle_to_unit(centers[1]);
    let u = o0 + o1;
    let v = o0 - o1;
    if u.norm_squared() < 1e-6 || v.norm_squared() < 1e-6 {
        return None;
    }
    Some([u.normalize(), v.normalize()])
}

/// z-component of `a × b`; positive when `b` turns clockwise from `a` on
/// screen (image y axis points down).
pub fn cross(a: Vector2<f32>, b: Vector2<f32>) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Squared distance to the image origin.
pub fn dist_to_origin_sq(p: Point2<f32>) -> f32 {
    p.coords.norm_squared()
}
