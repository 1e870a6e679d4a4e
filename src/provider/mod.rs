//! Uniform read access to volumes held by different backends.

mod chunked;
mod image_stack;
mod memory;

pub use chunked::ChunkedVolume;
pub use image_stack::{CacheSize, ImageStackVolume};
pub use memory::InMemoryVolume;

use crate::error::Result;
use crate::types::{normalize, DataType, Extent, Shape, Volume, VolumeIndex, Voxel};

/// A read-only 3D volume backed by memory, an image stack or a chunked store.
///
/// The shape is fixed at construction. Reads never modify the backing data.
pub enum VolumeProvider<T> {
    InMemory(InMemoryVolume<T>),
    ImageStack(ImageStackVolume<T>),
    Chunked(ChunkedVolume<T>),
}

impl<T: Voxel> VolumeProvider<T> {
    pub fn shape(&self) -> Shape {
        match self {
            VolumeProvider::InMemory(v) => v.shape(),
            VolumeProvider::ImageStack(v) => v.shape(),
            VolumeProvider::Chunked(v) => v.shape(),
        }
    }

    pub fn dtype(&self) -> DataType {
        T::DATA_TYPE
    }

    /// Read the sub-volume covered by `extent`. The result has shape
    /// `extent.shape()`; extents outside the volume yield `InvalidIndex`.
    pub fn read(&self, extent: &Extent) -> Result<Volume<T>> {
        match self {
            VolumeProvider::InMemory(v) => v.read(extent),
            VolumeProvider::ImageStack(v) => v.read(extent),
            VolumeProvider::Chunked(v) => v.read(extent),
        }
    }

    /// Read using a user-facing index (X, Y, Z order, or a single Z slice).
    pub fn read_index(&self, index: &VolumeIndex) -> Result<Volume<T>> {
        let extent = normalize(index, self.shape())?;
        self.read(&extent)
    }
}

impl<T> From<Volume<T>> for VolumeProvider<T> {
    fn from(volume: Volume<T>) -> Self {
        VolumeProvider::InMemory(InMemoryVolume::new(volume))
    }
}

impl<T> From<ImageStackVolume<T>> for VolumeProvider<T> {
    fn from(volume: ImageStackVolume<T>) -> Self {
        VolumeProvider::ImageStack(volume)
    }
}

impl<T> From<ChunkedVolume<T>> for VolumeProvider<T> {
    fn from(volume: ChunkedVolume<T>) -> Self {
        VolumeProvider::Chunked(volume)
    }
}
