use crate::error::Result;
use crate::types::{Extent, Shape, Volume, Voxel};

/// A volume held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryVolume<T> {
    volume: Volume<T>,
}

impl<T> InMemoryVolume<T> {
    pub fn new(volume: Volume<T>) -> Self {
        Self { volume }
    }
}

impl<T: Voxel> InMemoryVolume<T> {
    pub fn shape(&self) -> Shape {
        self.volume.shape()
    }

    pub fn read(&self, extent: &Extent) -> Result<Volume<T>> {
        self.volume.region(extent)
    }
}
