/// Which neighbors of a point take part in a local computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Neighborhood {
    /// The `k` nearest points, the query point included.
    Knn { k: usize },
    /// All points strictly closer than `radius`.
    Radius { radius: f32 },
    /// Up to `k` nearest points, all strictly closer than `radius`.
    KnnInRadius { k: usize, radius: f32 },
}

impl Neighborhood {
    pub fn knn(k: usize) -> Self {
        Self::Knn { k }
    }

    pub fn radius(radius: f32) -> Self {
        Self::Radius { radius }
    }

    pub fn knn_in_radius(k: usize, radius: f32) -> Self {
        Self::KnnInRadius { k, radius }
    }
}

impl std::fmt::Display for Neighborhood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Knn { k } => write!(f, "knn(k={})", k),
            Self::Radius { radius } => write!(f, "radius(r={})", radius),
            Self::KnnInRadius { k, radius } => write!(f, "knn_in_radius(k={}, r={})", k, radius),
        }
    }
}
