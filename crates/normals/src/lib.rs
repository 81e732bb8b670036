#![forbid(unsafe_code)]

pub mod error;
pub mod estimate;
pub mod pca;

pub use error::NormalEstimationError;
pub use estimate::{
    estimate_normals, estimate_normals_with_viewpoint, is_undefined, IndexHandle, NormalEstimator,
    MIN_NEIGHBORS, UNDEFINED_NORMAL,
};
pub use pca::PrincipalComponents;
