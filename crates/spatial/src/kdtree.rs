use kiddo::float::distance::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use pointclouds_core::{Point3, PointCloud};
use std::num::NonZero;

use crate::search::NeighborSearch;

/// A KdTree for efficient spatial queries on 3D point clouds.
///
/// Built on top of kiddo v5's `ImmutableKdTree`, which uses a cache-optimized
/// layout for faster queries than the mutable variant. The tree is built once
/// from a slice of points and cannot be modified afterwards, so shared
/// references can be queried from many threads at once.
///
/// The tree stores `u32` indices mapping back to the source slice.
#[derive(Debug, Clone)]
pub struct KdTree {
    tree: ImmutableKdTree<f32, u32, 3, 32>,
    num_points: usize,
}

impl KdTree {
    /// Build a KdTree over `points`.
    pub fn build(points: &[Point3]) -> Self {
        tracing::trace!(num_points = points.len(), "building kd-tree");

        Self {
            tree: ImmutableKdTree::new_from_slice(points),
            num_points: points.len(),
        }
    }

    /// Build a KdTree over the positions of a [`PointCloud`].
    pub fn from_cloud(cloud: &PointCloud) -> Self {
        Self::build(&cloud.points)
    }

    /// Returns the number of points in the tree.
    pub fn len(&self) -> usize {
        self.num_points
    }

    /// Returns true if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Find the `k` nearest neighbours to `query`.
    ///
    /// Returns `(indices, distances)` where distances are **squared**
    /// Euclidean, sorted in ascending order.
    ///
    /// Edge cases:
    /// - Returns empty if `k == 0`, the tree is empty, or query contains NaN.
    /// - If `k > len()`, returns all points.
    pub fn knn(&self, query: &Point3, k: usize) -> (Vec<usize>, Vec<f32>) {
        let Some(nz_k) = NonZero::new(k.min(self.num_points)) else {
            return (Vec::new(), Vec::new());
        };
        if self.is_empty() || !is_finite(query) {
            return (Vec::new(), Vec::new());
        }

        unzip(
            self.tree
                .nearest_n::<SquaredEuclidean>(query, nz_k)
                .into_iter()
                .map(|nn| (nn.item, nn.distance)),
        )
    }

    /// Find all points strictly closer than `sqrt(radius_sq)` to `query`.
    ///
    /// Results are ordered by index so the output does not depend on the
    /// tree's internal traversal.
    ///
    /// Edge cases:
    /// - Returns empty if `radius_sq <= 0` or NaN, the tree is empty, or
    ///   query contains NaN.
    /// - An infinite `radius_sq` is unbounded and returns every point.
    pub fn radius_search(&self, query: &Point3, radius_sq: f32) -> (Vec<usize>, Vec<f32>) {
        if self.is_empty() || !valid_radius_sq(radius_sq) || !is_finite(query) {
            return (Vec::new(), Vec::new());
        }
        let radius_sq = radius_sq.min(f32::MAX);

        let mut results: Vec<(u32, f32)> = self
            .tree
            .within_unsorted::<SquaredEuclidean>(query, radius_sq)
            .into_iter()
            .filter(|nn| nn.distance < radius_sq)
            .map(|nn| (nn.item, nn.distance))
            .collect();

        results.sort_unstable_by_key(|&(item, _)| item);

        unzip(results)
    }

    /// Find at most `k` nearest neighbours of `query` that are also strictly
    /// closer than `sqrt(radius_sq)`.
    ///
    /// Returns `(indices, distances)` sorted by ascending squared distance.
    /// Shares the empty-result edge cases of [`knn`](Self::knn) and
    /// [`radius_search`](Self::radius_search).
    pub fn knn_in_radius(&self, query: &Point3, k: usize, radius_sq: f32) -> (Vec<usize>, Vec<f32>) {
        let Some(nz_k) = NonZero::new(k.min(self.num_points)) else {
            return (Vec::new(), Vec::new());
        };
        if !valid_radius_sq(radius_sq) || !is_finite(query) {
            return (Vec::new(), Vec::new());
        }
        let radius_sq = radius_sq.min(f32::MAX);

        // nearest_n is sorted, so everything past the first out-of-range
        // neighbour is out of range too.
        unzip(
            self.tree
                .nearest_n::<SquaredEuclidean>(query, nz_k)
                .into_iter()
                .take_while(|nn| nn.distance < radius_sq)
                .map(|nn| (nn.item, nn.distance)),
        )
    }
}

impl NeighborSearch for KdTree {
    fn len(&self) -> usize {
        KdTree::len(self)
    }

    fn knn(&self, query: &Point3, k: usize) -> (Vec<usize>, Vec<f32>) {
        KdTree::knn(self, query, k)
    }

    fn radius_search(&self, query: &Point3, radius_sq: f32) -> (Vec<usize>, Vec<f32>) {
        KdTree::radius_search(self, query, radius_sq)
    }

    fn knn_in_radius(&self, query: &Point3, k: usize, radius_sq: f32) -> (Vec<usize>, Vec<f32>) {
        KdTree::knn_in_radius(self, query, k, radius_sq)
    }
}

#[inline]
fn is_finite(query: &Point3) -> bool {
    query.iter().all(|v| v.is_finite())
}

#[inline]
fn valid_radius_sq(radius_sq: f32) -> bool {
    radius_sq > 0.0
}

fn unzip(results: impl IntoIterator<Item = (u32, f32)>) -> (Vec<usize>, Vec<f32>) {
    results
        .into_iter()
        .map(|(item, distance)| (item as usize, distance))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::KdTree;
    use crate::NeighborSearch;
    use pointclouds_core::PointCloud;
    use proptest::prelude::*;

    fn on_x_axis(xs: &[f32]) -> Vec<[f32; 3]> {
        xs.iter().map(|&x| [x, 0.0, 0.0]).collect()
    }

    #[test]
    fn knn_returns_expected_neighbors() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 1.0, 2.0, 10.0]));
        let (idx, dist) = tree.knn(&[0.2, 0.0, 0.0], 2);
        assert_eq!(idx, vec![0, 1]);
        assert!(dist[0] <= dist[1]);
    }

    #[test]
    fn knn_distances_are_squared() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 3.0]));
        let (idx, dist) = tree.knn(&[0.0, 0.0, 0.0], 2);
        assert_eq!(idx, vec![0, 1]);
        assert_eq!(dist, vec![0.0, 9.0]);
    }

    #[test]
    fn from_cloud_indexes_cloud_points() {
        let cloud = PointCloud::from_points(on_x_axis(&[0.0, 5.0, 6.0]));
        let tree = KdTree::from_cloud(&cloud);
        assert_eq!(tree.len(), 3);
        let (idx, _) = tree.knn(&[5.9, 0.0, 0.0], 1);
        assert_eq!(idx, vec![2]);
    }

    #[test]
    fn radius_search_finds_points() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 0.5, 2.0]));
        let (idx, dist) = tree.radius_search(&[0.0, 0.0, 0.0], 0.75 * 0.75);
        assert_eq!(idx, vec![0, 1]);
        assert_eq!(dist.len(), 2);
    }

    #[test]
    fn radius_search_excludes_exact_boundary() {
        let tree = KdTree::build(&on_x_axis(&[1.0, 0.5]));
        let (idx, _) = tree.radius_search(&[0.0, 0.0, 0.0], 1.0);
        assert_eq!(idx, vec![1], "point at distance exactly 1.0 must be excluded");
    }

    #[test]
    fn radius_search_only_self_when_sparse() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 1.0, 2.0]));
        for (i, x) in [0.0f32, 1.0, 2.0].iter().enumerate() {
            let (idx, _) = tree.radius_search(&[*x, 0.0, 0.0], 0.25);
            assert_eq!(idx, vec![i]);
        }
    }

    #[test]
    fn knn_in_radius_caps_count_and_distance() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 0.1, 0.2, 0.3, 5.0]));
        let (idx, _) = tree.knn_in_radius(&[0.0, 0.0, 0.0], 3, 1.0);
        assert_eq!(idx, vec![0, 1, 2]);

        let (idx, _) = tree.knn_in_radius(&[0.0, 0.0, 0.0], 10, 1.0);
        assert_eq!(idx, vec![0, 1, 2, 3]);
    }

    #[test]
    fn knn_empty_tree() {
        let tree = KdTree::build(&[]);
        let (idx, dist) = tree.knn(&[0.0, 0.0, 0.0], 5);
        assert!(idx.is_empty());
        assert!(dist.is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn knn_k_zero() {
        let tree = KdTree::build(&[[1.0, 2.0, 3.0]]);
        let (idx, dist) = tree.knn(&[0.0, 0.0, 0.0], 0);
        assert!(idx.is_empty());
        assert!(dist.is_empty());
    }

    #[test]
    fn knn_nan_query() {
        let tree = KdTree::build(&[[1.0, 2.0, 3.0]]);
        let (idx, dist) = tree.knn(&[f32::NAN, 0.0, 0.0], 1);
        assert!(idx.is_empty());
        assert!(dist.is_empty());
    }

    #[test]
    fn radius_search_non_positive_radius() {
        let tree = KdTree::build(&[[0.0, 0.0, 0.0]]);
        assert!(tree.radius_search(&[0.0, 0.0, 0.0], 0.0).0.is_empty());
        assert!(tree.radius_search(&[0.0, 0.0, 0.0], -1.0).0.is_empty());
        assert!(tree.knn_in_radius(&[0.0, 0.0, 0.0], 3, 0.0).0.is_empty());
    }

    #[test]
    fn knn_k_larger_than_cloud() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 1.0, 2.0]));
        let (idx, _dist) = tree.knn(&[0.0, 0.0, 0.0], 100);
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn huge_k_is_capped_at_tree_size() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 1.0, 2.0]));
        let (idx, _) = tree.knn(&[0.0, 0.0, 0.0], usize::MAX);
        assert_eq!(idx, vec![0, 1, 2]);
        let (idx, _) = tree.knn_in_radius(&[0.0, 0.0, 0.0], usize::MAX, 2.0);
        assert_eq!(idx, vec![0, 1]);
    }

    #[test]
    fn infinite_radius_is_unbounded() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 1e10, -3.0]));
        let (idx, _) = tree.radius_search(&[0.0, 0.0, 0.0], f32::INFINITY);
        assert_eq!(idx, vec![0, 1, 2]);
        let (idx, _) = tree.knn_in_radius(&[0.0, 0.0, 0.0], 2, f32::INFINITY);
        assert_eq!(idx, vec![0, 2]);
        assert!(tree.radius_search(&[0.0, 0.0, 0.0], f32::NAN).0.is_empty());
    }

    #[test]
    fn trait_queries_match_inherent_queries() {
        let tree = KdTree::build(&on_x_axis(&[0.0, 3.0, 1.0, 7.0, 2.0]));
        let query = [0.5, 0.0, 0.0];
        let via_trait = |t: &dyn NeighborSearch| t.knn(&query, 3);
        assert_eq!(via_trait(&tree), tree.knn(&query, 3));
        assert_eq!(NeighborSearch::len(&&tree), 5);
    }

    proptest! {
        #[test]
        fn knn_returns_at_most_k_results(
            pts in prop::collection::vec(
                (-100.0f32..100.0f32, -100.0f32..100.0f32, -100.0f32..100.0f32),
                1..200
            ),
            k in 1usize..50,
        ) {
            let points: Vec<[f32; 3]> = pts.iter().map(|p| [p.0, p.1, p.2]).collect();
            let tree = KdTree::build(&points);
            let (idx, dist) = tree.knn(&[0.0, 0.0, 0.0], k);
            prop_assert!(idx.len() <= k);
            prop_assert!(idx.len() <= pts.len());
            prop_assert_eq!(idx.len(), dist.len());
        }

        #[test]
        fn radius_search_results_are_within_radius(
            pts in prop::collection::vec(
                (-100.0f32..100.0f32, -100.0f32..100.0f32, -100.0f32..100.0f32),
                1..200
            ),
            radius in 0.1f32..50.0f32,
        ) {
            let points: Vec<[f32; 3]> = pts.iter().map(|p| [p.0, p.1, p.2]).collect();
            let tree = KdTree::build(&points);
            let radius_sq = radius * radius;
            let (idx, dist) = tree.radius_search(&[0.0, 0.0, 0.0], radius_sq);
            for (&i, &d) in idx.iter().zip(&dist) {
                let [x, y, z] = points[i];
                prop_assert!(d < radius_sq);
                prop_assert!(
                    (x * x + y * y + z * z) <= radius_sq * (1.0 + 1e-5),
                    "point {} lies outside radius {}",
                    i,
                    radius,
                );
            }
        }

        #[test]
        fn knn_in_radius_is_knn_filtered_by_radius(
            pts in prop::collection::vec(
                (-10.0f32..10.0f32, -10.0f32..10.0f32, -10.0f32..10.0f32),
                1..100
            ),
            k in 1usize..20,
            radius in 0.5f32..10.0f32,
        ) {
            let points: Vec<[f32; 3]> = pts.iter().map(|p| [p.0, p.1, p.2]).collect();
            let tree = KdTree::build(&points);
            let radius_sq = radius * radius;
            let (hybrid, _) = tree.knn_in_radius(&[0.0, 0.0, 0.0], k, radius_sq);
            let (knn, knn_dist) = tree.knn(&[0.0, 0.0, 0.0], k);
            let expected: Vec<usize> = knn
                .into_iter()
                .zip(knn_dist)
                .filter(|(_, d)| *d < radius_sq)
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(hybrid, expected);
        }
    }
}
