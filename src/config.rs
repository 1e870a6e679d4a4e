//! Pipeline configuration file.

use crate::convert::ExportOptions;
use crate::error::{Result, VolumeError};
use crate::export::MeshFormat;
use crate::mesher::MeshingConfig;
use crate::provider::CacheSize;
use crate::segmentation::SegmentationConfig;
use crate::types::Shape;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings for every pipeline stage, loaded from JSON. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conversion_chunk_size: Shape,
    pub segmentation_block_size: Shape,
    pub segmentation_parallelism: usize,
    pub meshing_block_size: Shape,
    pub meshing_parallelism: usize,
    pub simplification_factor: f64,
    pub max_simplification_error: f64,
    /// Physical voxel size, x, y, z.
    pub voxel_size: [f32; 3],
    pub mesh_formats: Vec<MeshFormat>,
    pub image_cache: CacheSize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conversion_chunk_size: [300, 300, 300],
            segmentation_block_size: [64, 64, 64],
            segmentation_parallelism: 4,
            meshing_block_size: [512, 512, 512],
            meshing_parallelism: 4,
            simplification_factor: 100.0,
            max_simplification_error: 20.0,
            voxel_size: [1.0, 1.0, 1.0],
            mesh_formats: vec![MeshFormat::Obj, MeshFormat::Stl],
            image_cache: CacheSize::Auto,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("conversion_chunk_size", self.conversion_chunk_size),
            ("segmentation_block_size", self.segmentation_block_size),
            ("meshing_block_size", self.meshing_block_size),
        ];
        for (name, size) in sizes {
            if size.contains(&0) {
                return Err(VolumeError::InvalidConfig(format!("{} has a zero axis: {:?}", name, size)));
            }
        }
        if self.segmentation_parallelism == 0 || self.meshing_parallelism == 0 {
            return Err(VolumeError::InvalidConfig("parallelism must be positive".to_string()));
        }
        Ok(())
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::default().with_chunk_size(self.conversion_chunk_size)
    }

    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig::default()
            .with_block_size(self.segmentation_block_size)
            .with_parallelism(self.segmentation_parallelism)
    }

    /// Meshing settings. Fragments are written in the mesh formats too, with
    /// OBJ always among them.
    pub fn meshing(&self) -> MeshingConfig {
        MeshingConfig::default()
            .with_block_size(self.meshing_block_size)
            .with_simplification(self.simplification_factor, self.max_simplification_error)
            .with_voxel_size(self.voxel_size)
            .with_fragment_formats(self.mesh_formats.clone())
            .with_combined_formats(self.mesh_formats.clone())
            .with_parallelism(self.meshing_parallelism)
    }
}
