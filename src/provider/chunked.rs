use crate::error::Result;
use crate::store::ChunkedArray;
use crate::types::{Extent, Shape, Volume, Voxel};
use std::path::Path;

/// A volume read from a chunked array store.
pub struct ChunkedVolume<T> {
    array: ChunkedArray<T>,
}

impl<T: Voxel> ChunkedVolume<T> {
    pub fn new(array: ChunkedArray<T>) -> Self {
        Self { array }
    }

    /// Open the chunked array at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ChunkedArray::open(path)?))
    }

    pub fn array(&self) -> &ChunkedArray<T> {
        &self.array
    }

    pub fn shape(&self) -> Shape {
        self.array.shape()
    }

    pub fn read(&self, extent: &Extent) -> Result<Volume<T>> {
        self.array.read_region(extent)
    }
}
