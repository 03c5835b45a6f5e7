//! # ShapeCrate Retrieval
//!
//! Ranking of a reference corpus against query shapes.
//!
//! A [`Corpus`] holds processed shapes and the descriptor statistics fitted on
//! them. [`DistanceEngine`] compares signatures with a weighted Euclidean
//! distance over descriptors plus earth mover's distances over histograms;
//! [`HnswIndex`] answers approximate queries. [`Retriever`] ties these to
//! mesh files and [`Evaluator`] scores ranked results against known labels.

pub mod config;
pub mod cancel;
pub mod corpus;
pub mod distance;
pub mod ann;
pub mod retriever;
pub mod evaluation;

pub use config::*;
pub use cancel::*;
pub use corpus::*;
pub use distance::*;
pub use ann::*;
pub use retriever::*;
pub use evaluation::*;
