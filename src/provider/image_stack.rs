//! A volume stored as one 2D image file per Z slice.

use crate::error::{Result, VolumeError};
use crate::types::{Extent, Shape, Volume, Voxel};
use glob::Pattern;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How many decoded slices an image stack keeps in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSize {
    Disabled,
    Fixed(usize),
    /// Half of the currently available memory.
    #[default]
    Auto,
}

impl CacheSize {
    /// Number of slices of `width` x `height` to cache, or `None` for no cache.
    fn capacity(self, width: u32, height: u32) -> Option<NonZeroUsize> {
        match self {
            CacheSize::Disabled => None,
            CacheSize::Fixed(n) => NonZeroUsize::new(n),
            CacheSize::Auto => {
                let mut system = sysinfo::System::new();
                system.refresh_memory();
                // Budget as if each slice were decoded to RGBA f32.
                let slice_bytes = (width as u64 * height as u64 * 4 * 4).max(1);
                let slices = system.available_memory() / 2 / slice_bytes;
                NonZeroUsize::new(slices.max(1) as usize)
            }
        }
    }
}

/// Decoded slices keyed by image path.
type SliceCache<T> = Mutex<LruCache<PathBuf, Arc<Vec<T>>>>;

/// Image files (PNG, TIFF) sorted by name, decoded lazily on read.
pub struct ImageStackVolume<T> {
    paths: Vec<PathBuf>,
    width: u32,
    height: u32,
    cache: Option<SliceCache<T>>,
}

impl<T: Voxel> ImageStackVolume<T> {
    /// Collect every file in `directory` whose name matches the glob
    /// `pattern`, sorted by name.
    pub fn from_directory(directory: impl AsRef<Path>, pattern: &str, cache: CacheSize) -> Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(VolumeError::BackendRead {
                path: directory.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let matcher = Pattern::new(pattern)
            .map_err(|e| VolumeError::InvalidConfig(format!("bad image pattern {:?}: {}", pattern, e)))?;
        let mut paths = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if matcher.matches(&entry.file_name().to_string_lossy()) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(VolumeError::BackendRead {
                path: directory.to_path_buf(),
                message: format!("no images matching {:?}", pattern),
            });
        }
        Self::from_paths(paths, cache)
    }

    /// Use an explicit list of slice images, in Z order.
    pub fn from_paths(paths: Vec<PathBuf>, cache: CacheSize) -> Result<Self> {
        let first = paths.first().ok_or_else(|| VolumeError::BackendRead {
            path: PathBuf::new(),
            message: "empty image list".to_string(),
        })?;
        let (width, height) = image::image_dimensions(first).map_err(|e| VolumeError::BackendRead {
            path: first.clone(),
            message: e.to_string(),
        })?;

        let cache = cache.capacity(width, height).map(|capacity| {
            log::debug!("Image stack cache holds {} slices", capacity);
            Mutex::new(LruCache::new(capacity))
        });

        log::debug!(
            "Opened image stack of {} slices, {}x{}",
            paths.len(),
            width,
            height
        );
        Ok(Self {
            paths,
            width,
            height,
            cache,
        })
    }

    pub fn shape(&self) -> Shape {
        [self.paths.len(), self.height as usize, self.width as usize]
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn decode(&self, path: &Path) -> Result<Arc<Vec<T>>> {
        let read_error = |message: String| VolumeError::BackendRead {
            path: path.to_path_buf(),
            message,
        };

        let image = image::open(path).map_err(|e| read_error(e.to_string()))?;
        if image.width() != self.width || image.height() != self.height {
            return Err(read_error(format!(
                "slice is {}x{}, stack is {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }
        Ok(Arc::new(T::plane_from_image(image)))
    }

    fn slice(&self, z: usize) -> Result<Arc<Vec<T>>> {
        let path = &self.paths[z];
        let Some(cache) = &self.cache else {
            return self.decode(path);
        };

        if let Some(slice) = cache.lock().get(path) {
            return Ok(slice.clone());
        }
        // Decode outside the lock so other readers are not blocked.
        let slice = self.decode(path)?;
        cache.lock().put(path.clone(), slice.clone());
        Ok(slice)
    }

    /// Number of decoded slices currently cached.
    pub fn cached_slices(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    pub fn read(&self, extent: &Extent) -> Result<Volume<T>> {
        let shape = self.shape();
        if extent.is_empty() || !extent.fits_within(shape) {
            return Err(VolumeError::InvalidIndex(format!(
                "region {} outside image stack of shape {:?}",
                extent, shape
            )));
        }

        let width = shape[2];
        let mut data = Vec::with_capacity(extent.voxel_count());
        for z in extent.z.start..extent.z.stop {
            let slice = self.slice(z)?;
            for y in extent.y.start..extent.y.stop {
                let row = y * width;
                data.extend_from_slice(&slice[row + extent.x.start..row + extent.x.stop]);
            }
        }
        Volume::from_vec(extent.shape(), data)
    }
}
