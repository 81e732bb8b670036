/// A position, direction or viewpoint in 3D space.
pub type Point3 = [f32; 3];

/// A point cloud owning its positions and, optionally, one normal per point.
///
/// When `normals` is `Some`, entry `i` belongs to `points[i]`. Normal
/// estimators replace the whole vector at once, so the two stay index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3>,
    pub normals: Option<Vec<Point3>>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            normals: None,
        }
    }

    pub fn from_points(points: Vec<Point3>) -> Self {
        Self {
            points,
            normals: None,
        }
    }

    pub fn from_xyz(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have same length");
        assert_eq!(x.len(), z.len(), "x and z must have same length");

        let points = x
            .into_iter()
            .zip(y)
            .zip(z)
            .map(|((x, y), z)| [x, y, z])
            .collect();

        Self::from_points(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, i: usize) -> Point3 {
        self.points[i]
    }

    /// True when a normal vector is attached for every point.
    pub fn has_normals(&self) -> bool {
        self.normals
            .as_ref()
            .is_some_and(|n| n.len() == self.points.len())
    }

    /// Build a new cloud from the points at `indices`, in that order.
    ///
    /// Normals are carried along when present.
    ///
    /// # Panics
    ///
    /// Panics if any index in `indices` is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Self {
        let points = indices
            .iter()
            .map(|&idx| {
                assert!(idx < self.len(), "index out of bounds in select");
                self.points[idx]
            })
            .collect();

        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&idx| n[idx]).collect());

        Self { points, normals }
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Point3>> for PointCloud {
    fn from(points: Vec<Point3>) -> Self {
        Self::from_points(points)
    }
}
