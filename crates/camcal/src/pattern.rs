use nalgebra::Point3;

/// Known 3-D corner layout of the checkerboard, on the `z = 0` plane.
///
/// Points are ordered row index fastest: for each column `c`, rows
/// `0..rows` give `(r * s, c * s, 0)`. Detected corners use the same order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferencePattern {
    rows: usize,
    cols: usize,
    square_size: f64,
    points: Vec<Point3<f64>>,
}

impl ReferencePattern {
    pub fn new(rows: usize, cols: usize, square_size: f64) -> Self {
        let points = (0..cols)
            .flat_map(|c| {
                (0..rows).map(move |r| Point3::new(r as f64 * square_size, c as f64 * square_size, 0.0))
            })
            .collect();
        Self {
            rows,
            cols,
            square_size,
            points,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_has_54_points_in_row_fastest_order() {
        let s = 7.0 / 16.0;
        let p = ReferencePattern::new(6, 9, s);
        assert_eq!(p.len(), 54);
        assert_eq!(p.points()[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(p.points()[1], Point3::new(s, 0.0, 0.0));
        assert_eq!(p.points()[5], Point3::new(5.0 * s, 0.0, 0.0));
        assert_eq!(p.points()[6], Point3::new(0.0, s, 0.0));
        assert_eq!(p.points()[53], Point3::new(5.0 * s, 8.0 * s, 0.0));
        assert!(p.points().iter().all(|q| q.z == 0.0));
    }
}
