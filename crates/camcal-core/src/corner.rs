use nalgebra::Point2;

/// Canonical 2D corner used by the grid detector.
///
/// Obtained by adapting the output of the ChESS corner detector.
#[derive(Clone, Debug)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Orientation of the light-square diagonal at the corner, in radians.
    ///
    /// Defined modulo π because the diagonal is undirected.
    pub orientation: f32,

    /// Index of the diagonal family (0 or 1) after orientation clustering,
    /// `None` before clustering or for outliers.
    pub orientation_cluster: Option<usize>,

    /// Detector response.
    pub strength: f32,
}

impl Corner {
    pub fn new(position: Point2<f32>, orientation: f32, strength: f32) -> Self {
        Self {
            position,
            orientation,
            orientation_cluster: None,
            strength,
        }
    }
}

/// Integer grid coordinates (i, j) in board space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GridCoords {
    pub i: i32,
    pub j: i32,
}

impl GridCoords {
    pub fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    pub fn offset(self, di: i32, dj: i32) -> Self {
        Self {
            i: self.i + di,
            j: self.j + dj,
        }
    }
}
