//! Error types for the volume pipeline.

use crate::types::{Extent, ObjectId};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using VolumeError.
pub type Result<T> = std::result::Result<T, VolumeError>;

/// Main error type for volume, segmentation and meshing operations.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// Malformed slice or extent request. Always a caller bug.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Failed to read a source block from a backend.
    #[error("Backend read error for {path:?}: {message}")]
    BackendRead { path: PathBuf, message: String },

    /// The destination store rejected a write that overlaps one in flight.
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// An object expected at combine time has no fragments.
    #[error("No mesh fragments found for object {0}")]
    CombineMissingFragment(ObjectId),

    /// Two arrays that must agree in shape do not.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// The chunked store metadata is missing, malformed or of the wrong type.
    #[error("Invalid chunked store: {0}")]
    InvalidStore(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The segmenter failed or produced unusable output.
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Failed to export a mesh or image.
    #[error("Export error: {0}")]
    Export(String),

    /// Failed to parse a mesh file read back from disk.
    #[error("Mesh parse error: {0}")]
    MeshParse(String),

    /// The requested operation is not supported.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Processing of one block failed. Carries the block for retry.
    #[error("Block {extent} failed: {source}")]
    Block {
        extent: Extent,
        #[source]
        source: Box<VolumeError>,
    },

    /// Failed to build the worker pool.
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read or write an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to parse JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to write a ZIP archive.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl VolumeError {
    /// Wrap this error with the block it occurred in.
    pub fn in_block(self, extent: Extent) -> Self {
        VolumeError::Block {
            extent,
            source: Box::new(self),
        }
    }

    /// The block extent this error is attributed to, if any.
    pub fn block_extent(&self) -> Option<&Extent> {
        match self {
            VolumeError::Block { extent, .. } => Some(extent),
            _ => None,
        }
    }
}
