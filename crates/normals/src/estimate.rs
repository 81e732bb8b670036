use std::ops::Deref;

use pointclouds_core::{Point3, PointCloud};
use pointclouds_spatial::{KdTree, NeighborSearch, Neighborhood};
use rayon::prelude::*;
use tracing::debug;

use crate::error::NormalEstimationError;
use crate::pca::PrincipalComponents;

/// Fewest neighbors (the query point included) that define a plane.
pub const MIN_NEIGHBORS: usize = 3;

/// Marker stored for points whose neighborhood was too small to fit a plane.
pub const UNDEFINED_NORMAL: Point3 = [f32::NAN; 3];

/// Returns true for the [`UNDEFINED_NORMAL`] marker.
#[inline]
pub fn is_undefined(normal: &Point3) -> bool {
    normal.iter().any(|c| c.is_nan())
}

/// A spatial index the estimator either owns or borrows from the caller.
#[derive(Debug)]
pub enum IndexHandle<'a, I> {
    Owned(I),
    Borrowed(&'a I),
}

impl<I> IndexHandle<'_, I> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl<I> Deref for IndexHandle<'_, I> {
    type Target = I;

    fn deref(&self) -> &I {
        match self {
            Self::Owned(index) => index,
            Self::Borrowed(index) => index,
        }
    }
}

/// Estimates one surface normal per point by fitting a plane to each
/// point's neighborhood and orienting it toward a viewpoint.
///
/// The estimator reads a fixed point set through a spatial index. When
/// constructed over a [`PointCloud`] it can also write the result back into
/// the cloud's `normals` field (the `*_in_place` methods). Over a bare point
/// slice those methods do nothing.
///
/// Normals are oriented so that `dot(n, viewpoint - p) >= 0`. The viewpoint
/// defaults to the origin. Points with fewer than [`MIN_NEIGHBORS`] neighbors
/// receive [`UNDEFINED_NORMAL`].
///
/// ```ignore
/// let mut cloud = PointCloud::from_points(points);
/// let mut estimator = NormalEstimator::from_cloud(&mut cloud).with_viewpoint([0.0, 0.0, 10.0]);
/// estimator.estimate_in_place(Neighborhood::knn(10));
/// ```
pub struct NormalEstimator<'a, I = KdTree> {
    points: &'a [Point3],
    target: Option<&'a mut Option<Vec<Point3>>>,
    index: IndexHandle<'a, I>,
    viewpoint: Point3,
}

impl<'a> NormalEstimator<'a, KdTree> {
    /// Estimator over a point slice, with its own KdTree.
    pub fn new(points: &'a [Point3]) -> Self {
        let index = KdTree::build(points);
        Self::assemble(points, None, IndexHandle::Owned(index))
    }

    /// Estimator over a point cloud, with its own KdTree. In-place methods
    /// replace `cloud.normals`.
    pub fn from_cloud(cloud: &'a mut PointCloud) -> Self {
        let PointCloud { points, normals } = cloud;
        let points: &'a [Point3] = points;
        let index = KdTree::build(points);
        Self::assemble(points, Some(normals), IndexHandle::Owned(index))
    }
}

impl<'a, I: NeighborSearch> NormalEstimator<'a, I> {
    /// Estimator over a point slice, querying a caller-owned index.
    ///
    /// # Errors
    ///
    /// Returns [`NormalEstimationError::IndexSizeMismatch`] if `index` does
    /// not hold exactly as many points as `points`.
    pub fn with_index(points: &'a [Point3], index: &'a I) -> Result<Self, NormalEstimationError> {
        check_index_size(points, index)?;
        Ok(Self::assemble(points, None, IndexHandle::Borrowed(index)))
    }

    /// Estimator over a point cloud, querying a caller-owned index.
    ///
    /// # Errors
    ///
    /// Same as [`with_index`](Self::with_index).
    pub fn from_cloud_with_index(
        cloud: &'a mut PointCloud,
        index: &'a I,
    ) -> Result<Self, NormalEstimationError> {
        let PointCloud { points, normals } = cloud;
        let points: &'a [Point3] = points;
        check_index_size(points, index)?;
        Ok(Self::assemble(
            points,
            Some(normals),
            IndexHandle::Borrowed(index),
        ))
    }

    fn assemble(
        points: &'a [Point3],
        target: Option<&'a mut Option<Vec<Point3>>>,
        index: IndexHandle<'a, I>,
    ) -> Self {
        Self {
            points,
            target,
            index,
            viewpoint: [0.0, 0.0, 0.0],
        }
    }

    pub fn viewpoint(&self) -> &Point3 {
        &self.viewpoint
    }

    pub fn set_viewpoint(&mut self, viewpoint: Point3) -> &mut Self {
        self.viewpoint = viewpoint;
        self
    }

    pub fn with_viewpoint(mut self, viewpoint: Point3) -> Self {
        self.viewpoint = viewpoint;
        self
    }

    pub fn points(&self) -> &'a [Point3] {
        self.points
    }

    pub fn is_index_owned(&self) -> bool {
        self.index.is_owned()
    }

    /// True when a point cloud is attached for the `*_in_place` methods.
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }
}

impl<I: NeighborSearch + Sync> NormalEstimator<'_, I> {
    /// Normals from the `k` nearest neighbors of each point.
    ///
    /// Clouds with fewer than three points get [`UNDEFINED_NORMAL`]
    /// everywhere without querying the index.
    pub fn estimate_knn(&self, k: usize) -> Vec<Point3> {
        if self.points.len() < MIN_NEIGHBORS {
            debug!(
                num_points = self.points.len(),
                "too few points for a plane fit, all normals undefined"
            );
            return vec![UNDEFINED_NORMAL; self.points.len()];
        }

        let index = &*self.index;
        self.estimate_with(Neighborhood::knn(k), |p| index.knn(p, k).0)
    }

    /// Normals from all neighbors strictly within `radius` of each point.
    /// A negative radius selects no neighbors.
    pub fn estimate_radius(&self, radius: f32) -> Vec<Point3> {
        let radius_sq = squared_radius(radius);
        let index = &*self.index;
        self.estimate_with(Neighborhood::radius(radius), |p| {
            index.radius_search(p, radius_sq).0
        })
    }

    /// Normals from at most `k` nearest neighbors, each strictly within
    /// `radius` of the point.
    pub fn estimate_knn_in_radius(&self, k: usize, radius: f32) -> Vec<Point3> {
        let radius_sq = squared_radius(radius);
        let index = &*self.index;
        self.estimate_with(Neighborhood::knn_in_radius(k, radius), |p| {
            index.knn_in_radius(p, k, radius_sq).0
        })
    }

    /// Normals for the neighborhood mode described by `neighborhood`.
    pub fn estimate(&self, neighborhood: Neighborhood) -> Vec<Point3> {
        match neighborhood {
            Neighborhood::Knn { k } => self.estimate_knn(k),
            Neighborhood::Radius { radius } => self.estimate_radius(radius),
            Neighborhood::KnnInRadius { k, radius } => self.estimate_knn_in_radius(k, radius),
        }
    }

    /// [`estimate_knn`](Self::estimate_knn), stored into the attached cloud.
    pub fn estimate_knn_in_place(&mut self, k: usize) {
        self.write_in_place(|estimator| estimator.estimate_knn(k));
    }

    /// [`estimate_radius`](Self::estimate_radius), stored into the attached cloud.
    pub fn estimate_radius_in_place(&mut self, radius: f32) {
        self.write_in_place(|estimator| estimator.estimate_radius(radius));
    }

    /// [`estimate_knn_in_radius`](Self::estimate_knn_in_radius), stored into
    /// the attached cloud.
    pub fn estimate_knn_in_radius_in_place(&mut self, k: usize, radius: f32) {
        self.write_in_place(|estimator| estimator.estimate_knn_in_radius(k, radius));
    }

    /// [`estimate`](Self::estimate), stored into the attached cloud.
    pub fn estimate_in_place(&mut self, neighborhood: Neighborhood) {
        self.write_in_place(|estimator| estimator.estimate(neighborhood));
    }

    fn write_in_place<F>(&mut self, estimate: F)
    where
        F: FnOnce(&Self) -> Vec<Point3>,
    {
        if self.target.is_none() {
            debug!("no point cloud attached, skipping in-place normal estimation");
            return;
        }

        let normals = estimate(self);
        if let Some(target) = self.target.as_deref_mut() {
            *target = Some(normals);
        }
    }

    /// Fit one plane per point. Each iteration reads shared inputs and
    /// produces only its own output slot.
    fn estimate_with<F>(&self, neighborhood: Neighborhood, neighbors_of: F) -> Vec<Point3>
    where
        F: Fn(&Point3) -> Vec<usize> + Sync,
    {
        let points = self.points;
        let viewpoint = self.viewpoint;

        let normals: Vec<Point3> = (0..points.len())
            .into_par_iter()
            .map(|i| {
                let point = &points[i];
                let neighbors = neighbors_of(point);
                if neighbors.len() < MIN_NEIGHBORS {
                    return UNDEFINED_NORMAL;
                }

                let subset: Vec<Point3> = neighbors.iter().map(|&j| points[j]).collect();
                let normal = PrincipalComponents::fit(&subset).normal();

                orient_toward(normal, point, &viewpoint)
            })
            .collect();

        debug!(
            %neighborhood,
            num_points = points.len(),
            undefined = normals.iter().filter(|n| is_undefined(n)).count(),
            "estimated normals"
        );

        normals
    }
}

/// Estimate normals from the `k` nearest neighbors of each point, oriented
/// toward the origin.
///
/// Builds a throwaway KdTree; use [`NormalEstimator`] to reuse an index
/// across calls.
pub fn estimate_normals(points: &[Point3], k: usize) -> Vec<Point3> {
    estimate_normals_with_viewpoint(points, k, [0.0, 0.0, 0.0])
}

/// Same as [`estimate_normals`] but orients normals toward the given
/// viewpoint instead of the origin.
pub fn estimate_normals_with_viewpoint(points: &[Point3], k: usize, viewpoint: Point3) -> Vec<Point3> {
    NormalEstimator::new(points)
        .with_viewpoint(viewpoint)
        .estimate_knn(k)
}

fn check_index_size<I: NeighborSearch>(
    points: &[Point3],
    index: &I,
) -> Result<(), NormalEstimationError> {
    if index.len() != points.len() {
        return Err(NormalEstimationError::IndexSizeMismatch {
            index_len: index.len(),
            points_len: points.len(),
        });
    }
    Ok(())
}

/// Negative and NaN radii select nothing. A square that overflows to `+inf`
/// is an unbounded search.
#[inline]
fn squared_radius(radius: f32) -> f32 {
    let radius = radius.max(0.0);
    radius * radius
}

/// Flip `normal` if it points away from `viewpoint` as seen from `point`.
#[inline]
fn orient_toward(mut normal: Point3, point: &Point3, viewpoint: &Point3) -> Point3 {
    let dot = normal[0] * (viewpoint[0] - point[0])
        + normal[1] * (viewpoint[1] - point[1])
        + normal[2] * (viewpoint[2] - point[2]);
    if dot < 0.0 {
        for c in &mut normal {
            *c = -*c;
        }
    }
    normal
}
