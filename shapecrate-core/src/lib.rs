//! Core data structures and traits for shapecrate
//!
//! This crate provides the fundamental types shared by the retrieval pipeline:
//! points, triangle meshes and their measurements, transformations, the
//! per-shape record and its signature, and the common error type.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod transform;
pub mod shape;
pub mod signature;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use transform::*;
pub use shape::*;
pub use signature::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
