//! Dense in-memory 3D array.

use super::{Extent, Shape, Voxel};
use crate::error::{Result, VolumeError};

/// A dense 3D array stored row-major in Z, Y, X order.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: Voxel> Volume<T> {
    /// Create a volume filled with `T::default()` (zero).
    pub fn new(shape: Shape) -> Self {
        Self::filled(shape, T::default())
    }

    /// Create a volume filled with `value`.
    pub fn filled(shape: Shape, value: T) -> Self {
        Self {
            shape,
            data: vec![value; shape.iter().product()],
        }
    }

    /// Wrap an existing buffer. Its length must match the shape.
    pub fn from_vec(shape: Shape, data: Vec<T>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(VolumeError::InvalidIndex(format!(
                "buffer of {} elements does not match shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    fn offset(&self, [z, y, x]: [usize; 3]) -> usize {
        (z * self.shape[1] + y) * self.shape[2] + x
    }

    /// Value at `[z, y, x]`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, index: [usize; 3]) -> T {
        self.data[self.offset(index)]
    }

    #[inline]
    pub fn set(&mut self, index: [usize; 3], value: T) {
        let offset = self.offset(index);
        self.data[offset] = value;
    }

    /// Copy out the sub-region covered by `extent`.
    pub fn region(&self, extent: &Extent) -> Result<Volume<T>> {
        if extent.is_empty() || !extent.fits_within(self.shape) {
            return Err(VolumeError::InvalidIndex(format!(
                "region {} outside volume of shape {:?}",
                extent, self.shape
            )));
        }

        let shape = extent.shape();
        let mut data = Vec::with_capacity(extent.voxel_count());
        for z in extent.z.start..extent.z.stop {
            for y in extent.y.start..extent.y.stop {
                let row = self.offset([z, y, 0]);
                data.extend_from_slice(&self.data[row + extent.x.start..row + extent.x.stop]);
            }
        }
        Ok(Volume { shape, data })
    }

    /// Copy `source` into this volume with its lower corner at `origin`.
    pub fn paste(&mut self, origin: [usize; 3], source: &Volume<T>) -> Result<()> {
        let extent = Extent::from_origin_shape(origin, source.shape);
        if !extent.fits_within(self.shape) {
            return Err(VolumeError::InvalidIndex(format!(
                "paste target {} outside volume of shape {:?}",
                extent, self.shape
            )));
        }

        let row_len = source.shape[2];
        if row_len == 0 {
            return Ok(());
        }
        for (row_index, row) in source.data.chunks_exact(row_len).enumerate() {
            let z = row_index / source.shape[1];
            let y = row_index % source.shape[1];
            let start = self.offset([origin[0] + z, origin[1] + y, origin[2]]);
            self.data[start..start + row_len].copy_from_slice(row);
        }
        Ok(())
    }

    /// Row-major slice of the Z plane `z` (`shape[1] * shape[2]` values).
    pub fn plane(&self, z: usize) -> &[T] {
        let plane_len = self.shape[1] * self.shape[2];
        &self.data[z * plane_len..(z + 1) * plane_len]
    }

    pub fn plane_mut(&mut self, z: usize) -> &mut [T] {
        let plane_len = self.shape[1] * self.shape[2];
        &mut self.data[z * plane_len..(z + 1) * plane_len]
    }

    /// Element-wise conversion into another volume of the same shape.
    pub fn map<U: Voxel>(&self, f: impl Fn(T) -> U) -> Volume<U> {
        Volume {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Whether every element equals `value`.
    pub fn all_equal(&self, value: T) -> bool {
        self.data.iter().all(|&v| v == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: Shape) -> Volume<u16> {
        let n: usize = shape.iter().product();
        Volume::from_vec(shape, (0..n as u16).collect()).unwrap()
    }

    #[test]
    fn test_region_copies_sub_box() {
        let volume = ramp([3, 4, 5]);
        let region = volume.region(&Extent::new((1, 3), (2, 4), (1, 3))).unwrap();

        assert_eq!(region.shape(), [2, 2, 2]);
        assert_eq!(region.get([0, 0, 0]), volume.get([1, 2, 1]));
        assert_eq!(region.get([1, 1, 1]), volume.get([2, 3, 2]));
    }

    #[test]
    fn test_region_rejects_out_of_bounds() {
        let volume = ramp([2, 2, 2]);
        let result = volume.region(&Extent::new((0, 3), (0, 2), (0, 2)));
        assert!(matches!(result, Err(VolumeError::InvalidIndex(_))));
    }

    #[test]
    fn test_paste_then_region_roundtrip() {
        let mut canvas = Volume::<u16>::new([4, 4, 4]);
        let patch = ramp([2, 3, 1]);
        canvas.paste([1, 0, 2], &patch).unwrap();

        let back = canvas.region(&Extent::new((1, 3), (0, 3), (2, 3))).unwrap();
        assert_eq!(back, patch);
        assert_eq!(canvas.get([0, 0, 0]), 0);
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        assert!(Volume::<u8>::from_vec([2, 2, 2], vec![0; 7]).is_err());
    }

    #[test]
    fn test_plane_access() {
        let mut volume = ramp([2, 2, 3]);
        assert_eq!(volume.plane(1), &[6, 7, 8, 9, 10, 11]);
        volume.plane_mut(0).fill(0);
        assert!(volume.plane(0).iter().all(|&v| v == 0));
    }
}
