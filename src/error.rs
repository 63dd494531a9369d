//! Error types for the slide2yolo library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for slide2yolo operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Error types that can occur while preparing a dataset.
#[derive(Error, Debug)]
pub enum PrepError {
    /// Error during I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific file.
    #[error("IO error on {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during JSON parsing or serialization.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error while decoding or encoding a raster.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid glob pattern built from a directory path.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// Coordinates that cannot be turned into a bounding box.
    #[error("Malformed geometry in feature {feature}: {reason}")]
    MalformedGeometry { feature: usize, reason: String },

    /// A region read the slide cannot serve.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Split proportions that do not sum to one.
    #[error("Split ratios must sum to 1 (got train={train}, test={test}, val={val})")]
    InvalidSplitRatios { train: f64, test: f64, val: f64 },

    /// The external trainer failed.
    #[error("Training failed: {0}")]
    Training(String),
}

impl PrepError {
    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::IoAt {
            path: path.into(),
            source,
        }
    }
}
