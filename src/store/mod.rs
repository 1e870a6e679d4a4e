//! Chunked on-disk array storage.
//!
//! Arrays use the Zarr v2 directory layout: a `.zarray` JSON metadata file
//! next to one file per chunk, named `cz.cy.cx`. Chunks are stored
//! uncompressed in C order with little-endian elements. Edge chunks are
//! stored at full chunk size, padded with the fill value. A chunk whose
//! elements all equal the fill value is not stored unless
//! `write_empty_chunks` is enabled.

mod locks;

use crate::error::{Result, VolumeError};
use crate::types::{DataType, Extent, Shape, Volume, Voxel};
use locks::{ChunkLocks, RegionRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = ".zarray";

/// Contents of a `.zarray` metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub shape: Shape,
    pub chunks: Shape,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: serde_json::Value,
    pub order: String,
    pub filters: Option<serde_json::Value>,
    #[serde(default = "default_separator")]
    pub dimension_separator: String,
}

fn default_separator() -> String {
    ".".to_string()
}

impl ArrayMetadata {
    fn new(shape: Shape, chunks: Shape, data_type: DataType, fill_value: f64) -> Self {
        Self {
            zarr_format: 2,
            shape,
            chunks,
            dtype: data_type.zarr_dtype().to_string(),
            compressor: None,
            fill_value: serde_json::json!(fill_value),
            order: "C".to_string(),
            filters: None,
            dimension_separator: default_separator(),
        }
    }

    /// Read and validate the metadata of the array at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let metadata_path = path.join(METADATA_FILE);
        let contents = fs::read_to_string(&metadata_path).map_err(|e| {
            VolumeError::InvalidStore(format!("cannot read {:?}: {}", metadata_path, e))
        })?;
        let metadata: ArrayMetadata = serde_json::from_str(&contents)?;

        if metadata.zarr_format != 2 {
            return Err(VolumeError::InvalidStore(format!(
                "unsupported zarr format {}",
                metadata.zarr_format
            )));
        }
        if metadata.compressor.is_some() {
            return Err(VolumeError::InvalidStore(
                "compressed chunks are not supported".to_string(),
            ));
        }
        if metadata.order != "C" {
            return Err(VolumeError::InvalidStore(format!(
                "unsupported order {:?}",
                metadata.order
            )));
        }
        if metadata.chunks.contains(&0) {
            return Err(VolumeError::InvalidStore("zero chunk size".to_string()));
        }
        metadata.data_type()?;
        Ok(metadata)
    }

    pub fn data_type(&self) -> Result<DataType> {
        DataType::from_zarr_dtype(&self.dtype)
            .ok_or_else(|| VolumeError::InvalidStore(format!("unsupported dtype {:?}", self.dtype)))
    }

    fn fill_value<T: Voxel>(&self) -> T {
        T::from_f64(self.fill_value.as_f64().unwrap_or(0.0))
    }
}

/// A chunked 3D array on disk, typed by its element.
///
/// Safe to share between threads: each chunk's read-modify-write is
/// serialized, and concurrent writes to overlapping regions are rejected with
/// `WriteConflict`.
#[derive(Debug)]
pub struct ChunkedArray<T> {
    root: PathBuf,
    metadata: ArrayMetadata,
    fill_value: T,
    write_empty_chunks: bool,
    chunk_locks: ChunkLocks,
    in_flight: RegionRegistry,
    _marker: PhantomData<T>,
}

impl<T: Voxel> ChunkedArray<T> {
    /// Create a new array at `path`, replacing any existing one.
    pub fn create(path: impl AsRef<Path>, shape: Shape, chunks: Shape, fill_value: T) -> Result<Self> {
        if chunks.contains(&0) {
            return Err(VolumeError::InvalidConfig(format!(
                "chunk size must be positive, got {:?}",
                chunks
            )));
        }

        let root = path.as_ref().to_path_buf();
        if root.exists() {
            log::debug!("Replacing existing array at {:?}", root);
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;

        let metadata = ArrayMetadata::new(shape, chunks, T::DATA_TYPE, fill_value.to_f64());
        fs::write(root.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;
        log::debug!(
            "Created {} array {:?} with shape {:?}, chunks {:?}",
            T::DATA_TYPE,
            root,
            shape,
            chunks
        );

        Ok(Self::from_parts(root, metadata, fill_value))
    }

    /// Open an existing array. Its dtype must match `T`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let metadata = ArrayMetadata::load(&root)?;
        let data_type = metadata.data_type()?;
        if data_type != T::DATA_TYPE {
            return Err(VolumeError::InvalidStore(format!(
                "array {:?} holds {}, expected {}",
                root,
                data_type,
                T::DATA_TYPE
            )));
        }
        let fill_value = metadata.fill_value();
        Ok(Self::from_parts(root, metadata, fill_value))
    }

    fn from_parts(root: PathBuf, metadata: ArrayMetadata, fill_value: T) -> Self {
        Self {
            root,
            metadata,
            fill_value,
            write_empty_chunks: false,
            chunk_locks: ChunkLocks::default(),
            in_flight: RegionRegistry::default(),
            _marker: PhantomData,
        }
    }

    /// Store chunks even when every element equals the fill value.
    pub fn with_write_empty_chunks(mut self, write_empty_chunks: bool) -> Self {
        self.write_empty_chunks = write_empty_chunks;
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn shape(&self) -> Shape {
        self.metadata.shape
    }

    pub fn chunks(&self) -> Shape {
        self.metadata.chunks
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn fill_value(&self) -> T {
        self.fill_value
    }

    /// Number of chunks along each axis.
    pub fn chunk_grid(&self) -> Shape {
        let shape = self.shape();
        let chunks = self.chunks();
        [0, 1, 2].map(|i| shape[i].div_ceil(chunks[i]))
    }

    fn chunk_path(&self, [cz, cy, cx]: [usize; 3]) -> PathBuf {
        self.root.join(format!("{}.{}.{}", cz, cy, cx))
    }

    fn chunk_extent(&self, index: [usize; 3]) -> Extent {
        let chunks = self.chunks();
        Extent::from_origin_shape([0, 1, 2].map(|i| index[i] * chunks[i]), chunks)
    }

    /// Indices of every chunk overlapping `extent`, in Z, Y, X order.
    fn chunks_overlapping(&self, extent: &Extent) -> Vec<[usize; 3]> {
        let chunks = self.chunks();
        let axes = extent.axes();
        let ranges: [_; 3] =
            [0, 1, 2].map(|i| axes[i].start / chunks[i]..axes[i].stop.div_ceil(chunks[i]));

        let mut indices = Vec::new();
        for cz in ranges[0].clone() {
            for cy in ranges[1].clone() {
                for cx in ranges[2].clone() {
                    indices.push([cz, cy, cx]);
                }
            }
        }
        indices
    }

    fn read_chunk(&self, index: [usize; 3]) -> Result<Volume<T>> {
        let chunk_shape = self.chunks();
        let path = self.chunk_path(index);
        let read_error = |message: String| VolumeError::BackendRead {
            path: path.clone(),
            message,
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Volume::filled(chunk_shape, self.fill_value));
            }
            Err(e) => return Err(read_error(e.to_string())),
        };

        let element_size = T::DATA_TYPE.size();
        let expected = chunk_shape.iter().product::<usize>() * element_size;
        if bytes.len() != expected {
            return Err(read_error(format!(
                "chunk {:?} has {} bytes, expected {}",
                index,
                bytes.len(),
                expected
            )));
        }

        let data = bytes.chunks_exact(element_size).map(T::read_le).collect();
        Volume::from_vec(chunk_shape, data)
    }

    fn write_chunk(&self, index: [usize; 3], chunk: &Volume<T>) -> Result<()> {
        let path = self.chunk_path(index);
        if !self.write_empty_chunks && chunk.all_equal(self.fill_value) {
            return match fs::remove_file(&path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        let mut bytes = Vec::with_capacity(chunk.len() * T::DATA_TYPE.size());
        for &value in chunk.as_slice() {
            value.write_le(&mut bytes);
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn check_bounds(&self, extent: &Extent) -> Result<()> {
        if extent.is_empty() || !extent.fits_within(self.shape()) {
            return Err(VolumeError::InvalidIndex(format!(
                "region {} outside array of shape {:?}",
                extent,
                self.shape()
            )));
        }
        Ok(())
    }

    /// Read the region covered by `extent`.
    pub fn read_region(&self, extent: &Extent) -> Result<Volume<T>> {
        self.check_bounds(extent)?;

        let mut out = Volume::filled(extent.shape(), self.fill_value);
        let origin = extent.origin();
        for index in self.chunks_overlapping(extent) {
            let chunk_extent = self.chunk_extent(index);
            let Some(overlap) = chunk_extent.intersect(extent) else {
                continue;
            };

            let chunk = self.chunk_locks.with_lock(index, || self.read_chunk(index))?;
            let part = chunk.region(&local_to(&overlap, chunk_extent.origin()))?;
            out.paste(offset_from(&overlap, origin), &part)?;
        }
        Ok(out)
    }

    /// Write `data` with its lower corner at `origin`.
    ///
    /// Fails with `WriteConflict` if another write to an overlapping region is
    /// still in flight.
    pub fn write_region(&self, origin: [usize; 3], data: &Volume<T>) -> Result<()> {
        let extent = Extent::from_origin_shape(origin, data.shape());
        self.check_bounds(&extent)?;
        let _claim = self.in_flight.claim(extent)?;

        for index in self.chunks_overlapping(&extent) {
            let chunk_extent = self.chunk_extent(index);
            let Some(overlap) = chunk_extent.intersect(&extent) else {
                continue;
            };
            let part = data.region(&local_to(&overlap, origin))?;

            self.chunk_locks.with_lock(index, || {
                let mut chunk = self.read_chunk(index)?;
                chunk.paste(offset_from(&overlap, chunk_extent.origin()), &part)?;
                self.write_chunk(index, &chunk)
            })?;
        }
        Ok(())
    }

    /// Number of chunk files currently stored.
    pub fn stored_chunk_count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            if name.to_string_lossy() != METADATA_FILE {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// `extent` translated into a frame whose origin is `origin`.
fn local_to(extent: &Extent, origin: [usize; 3]) -> Extent {
    Extent::from_origin_shape(offset_from(extent, origin), extent.shape())
}

fn offset_from(extent: &Extent, origin: [usize; 3]) -> [usize; 3] {
    let start = extent.origin();
    [0, 1, 2].map(|i| start[i] - origin[i])
}
