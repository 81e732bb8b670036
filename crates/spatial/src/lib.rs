#![forbid(unsafe_code)]

pub mod kdtree;
pub mod neighborhood;
pub mod search;

pub use kdtree::KdTree;
pub use neighborhood::Neighborhood;
pub use search::NeighborSearch;
