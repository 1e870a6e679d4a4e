//! # Volume Mesher
//!
//! Out-of-core segmentation and surface meshing for 3D scan volumes that do
//! not fit in memory.
//!
//! ## Overview
//!
//! A volume is read through a [`VolumeProvider`] (in memory, an image stack
//! or a chunked store), split into blocks by the [`BlockPlanner`], and
//! processed block by block on a bounded worker pool:
//!
//! - [`ChunkedSegmentationWriter`] segments each block and writes the labels
//!   to a chunked store.
//! - [`ChunkedMesher`] meshes every labeled object per block into fragments,
//!   then combines the fragments of each object into one mesh.
//!
//! ## Quick Start
//!
//! ```ignore
//! use volume_mesher::{
//!     ChunkedMesher, ChunkedSegmentationWriter, ChunkedVolume, ImageStackVolume,
//!     CacheSize, MeshingConfig, SegmentationConfig, ThresholdSegmenter, VolumeProvider,
//! };
//!
//! let scan = VolumeProvider::from(ImageStackVolume::<u8>::from_directory("scan/", "*.png", CacheSize::Auto)?);
//!
//! let labels = ChunkedSegmentationWriter::new(SegmentationConfig::default())
//!     .run(&scan, "labels.zarr", &ThresholdSegmenter::new(128.0), None)?;
//!
//! let labels = VolumeProvider::from(ChunkedVolume::new(labels));
//! let report = ChunkedMesher::new(&labels, "meshes/", MeshingConfig::default()).run(None)?;
//! println!("{} objects meshed", report.combined.len());
//! ```

pub mod archive;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod mesher;
pub mod planner;
pub mod pool;
pub mod progress;
pub mod provider;
pub mod segmentation;
pub mod stitching;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use archive::archive_combined_meshes;
pub use config::PipelineConfig;
pub use convert::{export_to_chunked, export_to_image_stack, ExportOptions};
pub use error::{Result, VolumeError};
pub use export::{export_glb, export_obj, export_stl_ascii, export_stl_binary, MeshFormat};
pub use mesher::{
    combine_directory, combine_fragments, ChunkedMesher, FragmentKey, Mesh, MeshRunReport, MeshRunState,
    MeshingConfig,
};
pub use planner::{Block, BlockPlanner};
pub use progress::ProgressCallback;
pub use provider::{CacheSize, ChunkedVolume, ImageStackVolume, InMemoryVolume, VolumeProvider};
pub use segmentation::{
    ChunkedSegmentationWriter, ConnectedComponentsSegmenter, SegmentationConfig, Segmenter, ThresholdSegmenter,
};
pub use stitching::{join_segmentations, AlignedStitcher, ImageCombiner};
pub use store::{ArrayMetadata, ChunkedArray};
pub use types::{AxisIndex, DataType, Extent, ObjectId, Progress, Shape, Volume, VolumeIndex, Voxel};
