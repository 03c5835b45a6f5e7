//! # ShapeCrate Algorithms
//!
//! Geometry processing for shape retrieval.
//!
//! This crate brings meshes into a canonical pose, measures them, and turns
//! the measurements into a signature: scalar descriptors plus shape
//! distribution histograms.

pub mod normalization;
pub mod hull;
pub mod features;
pub mod descriptors;
pub mod sampling;
pub mod histograms;
pub mod pipeline;

// Re-export commonly used items
pub use normalization::*;
pub use hull::*;
pub use features::*;
pub use descriptors::*;
pub use sampling::*;
pub use histograms::*;
pub use pipeline::*;
