//! Error types for shapecrate

use thiserror::Error;

/// Main error type for shapecrate operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load geometry from {path}: {reason}")]
    GeometryLoad { path: String, reason: String },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Normalization failed: {0}")]
    NormalizationFailure(String),

    #[error("Approximate index has not been built")]
    IndexNotReady,

    #[error("Corpus is empty")]
    CorpusEmpty,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Wrap any error raised while reading a geometry file
    pub fn geometry_load(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Error::GeometryLoad {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for shapecrate operations
pub type Result<T> = std::result::Result<T, Error>;
