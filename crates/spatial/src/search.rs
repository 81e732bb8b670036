use pointclouds_core::Point3;

/// Read-only proximity queries over a fixed set of points.
///
/// Every query returns `(indices, squared_distances)` of equal length. The
/// result may hold fewer entries than requested; callers must not rely on
/// the order.
///
/// Implementations are queried through `&self` only. Code that fans queries
/// out over threads additionally requires `Self: Sync`.
pub trait NeighborSearch {
    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `k` points closest to `query`.
    fn knn(&self, query: &Point3, k: usize) -> (Vec<usize>, Vec<f32>);

    /// Every point whose squared distance to `query` is below `radius_sq`.
    fn radius_search(&self, query: &Point3, radius_sq: f32) -> (Vec<usize>, Vec<f32>);

    /// At most `k` of the closest points, each with a squared distance below
    /// `radius_sq`.
    fn knn_in_radius(&self, query: &Point3, k: usize, radius_sq: f32) -> (Vec<usize>, Vec<f32>);
}

impl<T: NeighborSearch + ?Sized> NeighborSearch for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn knn(&self, query: &Point3, k: usize) -> (Vec<usize>, Vec<f32>) {
        (**self).knn(query, k)
    }

    fn radius_search(&self, query: &Point3, radius_sq: f32) -> (Vec<usize>, Vec<f32>) {
        (**self).radius_search(query, radius_sq)
    }

    fn knn_in_radius(&self, query: &Point3, k: usize, radius_sq: f32) -> (Vec<usize>, Vec<f32>) {
        (**self).knn_in_radius(query, k, radius_sq)
    }
}
