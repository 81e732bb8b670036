#![forbid(unsafe_code)]

pub mod cloud;

pub use cloud::{Point3, PointCloud};
