//! Conversion between volume backends.

use crate::error::{Result, VolumeError};
use crate::pool::WorkerPool;
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::provider::VolumeProvider;
use crate::store::ChunkedArray;
use crate::types::{DataType, Extent, Shape, Volume, Voxel};
use image::{ImageBuffer, ImageFormat, Luma};
use std::fs;
use std::path::{Path, PathBuf};

/// Options for [`export_to_chunked`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Chunk size of the output array.
    pub chunk_size: Shape,
    /// Keep every n-th voxel along each axis, Z, Y, X.
    pub downsample: [usize; 3],
    /// Number of output Z planes written per step.
    pub slab_depth: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            chunk_size: [300, 300, 300],
            downsample: [1, 1, 1],
            slab_depth: 8,
        }
    }
}

impl ExportOptions {
    pub fn with_chunk_size(mut self, chunk_size: Shape) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_downsample(mut self, downsample: [usize; 3]) -> Self {
        self.downsample = downsample;
        self
    }

    pub fn with_slab_depth(mut self, slab_depth: usize) -> Self {
        self.slab_depth = slab_depth;
        self
    }

    /// Output shape for a source of shape `shape`: `ceil(shape / downsample)`.
    pub fn output_shape(&self, shape: Shape) -> Shape {
        [0, 1, 2].map(|axis| shape[axis].div_ceil(self.downsample[axis]))
    }
}

/// Copy `source` into a new chunked array at `path`, slab by slab along Z.
///
/// Progress is reported once per slab.
pub fn export_to_chunked<T: Voxel>(
    source: &VolumeProvider<T>,
    path: impl AsRef<Path>,
    options: &ExportOptions,
    progress: Option<ProgressCallback<'_>>,
) -> Result<ChunkedArray<T>> {
    if options.downsample.contains(&0) || options.slab_depth == 0 {
        return Err(VolumeError::InvalidConfig(format!(
            "downsample {:?} and slab depth {} must be positive",
            options.downsample, options.slab_depth
        )));
    }

    let shape = source.shape();
    let output_shape = options.output_shape(shape);
    let array = ChunkedArray::create(path, output_shape, options.chunk_size, T::default())?;
    let [f_z, f_y, f_x] = options.downsample;

    let slabs: Vec<(usize, usize)> = (0..output_shape[0])
        .step_by(options.slab_depth)
        .map(|start| (start, (start + options.slab_depth).min(output_shape[0])))
        .collect();
    log::info!(
        "Exporting {:?} volume to {:?} as {:?} in {} slabs",
        shape,
        array.path(),
        output_shape,
        slabs.len()
    );

    let reporter = ProgressReporter::new(slabs.len(), progress);
    for &(out_start, out_stop) in &slabs {
        let extent = Extent::new(
            (out_start * f_z, ((out_stop - 1) * f_z + 1).min(shape[0])),
            (0, shape[1]),
            (0, shape[2]),
        );
        let data = source.read(&extent)?;
        let slab = if options.downsample == [1, 1, 1] {
            data
        } else {
            let slab_shape = [out_stop - out_start, output_shape[1], output_shape[2]];
            let mut values = Vec::with_capacity(slab_shape.iter().product());
            for z in 0..slab_shape[0] {
                for y in 0..slab_shape[1] {
                    for x in 0..slab_shape[2] {
                        values.push(data.get([z * f_z, y * f_y, x * f_x]));
                    }
                }
            }
            Volume::from_vec(slab_shape, values)?
        };
        array.write_region([out_start, 0, 0], &slab)?;
        reporter.advance();
    }
    Ok(array)
}

/// Write one PNG per Z plane of `source` into `dir`, named `{z:06}.png`.
///
/// `u8` volumes are written as 8-bit grayscale; every other type is
/// saturated to 16 bits.
pub fn export_to_image_stack<T: Voxel>(
    source: &VolumeProvider<T>,
    dir: impl AsRef<Path>,
    parallelism: usize,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let pool = WorkerPool::new(parallelism)?;
    let [depth, height, width] = source.shape();
    log::info!("Exporting {} planes to {:?}", depth, dir);

    let planes: Vec<usize> = (0..depth).collect();
    pool.try_map(&planes, |&z| {
        let plane = source.read(&Extent::new((z, z + 1), (0, height), (0, width)))?;
        let path = dir.join(format!("{:06}.png", z));
        save_plane(&path, plane.as_slice(), width as u32, height as u32)?;
        Ok(path)
    })
}

fn save_plane<T: Voxel>(path: &Path, values: &[T], width: u32, height: u32) -> Result<()> {
    let size_error = || VolumeError::Export(format!("plane size does not match {}x{}", width, height));
    if T::DATA_TYPE == DataType::U8 {
        let raw: Vec<u8> = values.iter().map(|v| v.to_f64() as u8).collect();
        ImageBuffer::<Luma<u8>, _>::from_raw(width, height, raw)
            .ok_or_else(size_error)?
            .save_with_format(path, ImageFormat::Png)?;
    } else {
        let raw: Vec<u16> = values.iter().map(|v| v.to_f64().clamp(0.0, u16::MAX as f64) as u16).collect();
        ImageBuffer::<Luma<u16>, _>::from_raw(width, height, raw)
            .ok_or_else(size_error)?
            .save_with_format(path, ImageFormat::Png)?;
    }
    Ok(())
}
