//! # ShapeCrate
//!
//! Content-based retrieval of 3D polygon shapes.
//!
//! This is the umbrella crate that provides convenient access to all ShapeCrate
//! functionality. You can use this crate to get everything in one place, or use
//! individual crates for more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Meshes, transformations, the shape record and its signature
//! - **Algorithms**: Pose normalization, feature extraction, descriptors and shape distributions
//! - **I/O**: OBJ, PLY and OFF meshes, persisted corpus store
//! - **Retrieval**: Corpus construction, weighted EMD ranking, HNSW index, evaluation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shapecrate::prelude::*;
//! use std::path::Path;
//!
//! let (corpus, report) = CorpusBuilder::new(PipelineConfig::default())
//!     .build_from_directory(Path::new("meshes"), &CancellationToken::new())?;
//! println!("{} shapes, {} skipped", report.processed, report.failures.len());
//!
//! let retriever = Retriever::new(corpus, RetrievalConfig::default())?;
//! let cancel = CancellationToken::new();
//! for m in retriever.query(Path::new("query.off"), &WeightVector::default(), 5, false, &cancel)? {
//!     println!("{} {:.4}", m.id, m.distance);
//! }
//! # Ok::<(), shapecrate::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms, io and retrieval
//! - `algorithms`: Normalization and signature computation
//! - `io`: Mesh files and the corpus store
//! - `retrieval`: Ranking and evaluation (implies `algorithms` and `io`)

// Re-export core functionality
pub use shapecrate_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use shapecrate_algorithms as algorithms;

#[cfg(feature = "io")]
pub use shapecrate_io as io;

#[cfg(feature = "retrieval")]
pub use shapecrate_retrieval as retrieval;

/// Convenient imports for common use cases
pub mod prelude {
    pub use shapecrate_core::*;

    #[cfg(feature = "algorithms")]
    pub use shapecrate_algorithms::*;

    #[cfg(feature = "io")]
    pub use shapecrate_io::*;

    #[cfg(feature = "retrieval")]
    pub use shapecrate_retrieval::*;
}
