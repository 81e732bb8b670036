#![forbid(unsafe_code)]

//! Surface normal estimation for 3D point clouds.
//!
//! Re-exports the workspace crates under one roof: the point cloud
//! container, the neighbor search index and the normal estimator.

pub use pointclouds_core;
pub use pointclouds_normals;
pub use pointclouds_spatial;

pub use pointclouds_core::{Point3, PointCloud};
pub use pointclouds_normals::{
    estimate_normals, estimate_normals_with_viewpoint, is_undefined, NormalEstimationError,
    NormalEstimator, PrincipalComponents, UNDEFINED_NORMAL,
};
pub use pointclouds_spatial::{KdTree, NeighborSearch, Neighborhood};
