//! Block-wise surface meshing of labeled volumes.
//!
//! A label volume is meshed one block at a time: every object in a block
//! becomes a fragment on disk, and once all blocks are done the fragments of
//! each object are concatenated into its combined mesh.

pub mod combine;
pub mod fragments;
pub mod geometry;
pub mod simplify;
pub mod surface_nets;

pub use combine::{combine_all, combine_directory, combine_fragments, combine_object, CombineReport};
pub use fragments::{FragmentKey, FragmentStore};
pub use geometry::Mesh;
pub use simplify::simplify;
pub use surface_nets::extract_surface;

use crate::error::{Result, VolumeError};
use crate::export::MeshFormat;
use crate::planner::{Block, BlockPlanner};
use crate::pool::WorkerPool;
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::provider::VolumeProvider;
use crate::types::{Extent, ObjectId, Shape, Volume, Voxel, BACKGROUND};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Meshing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshingConfig {
    /// Size of each meshing block.
    pub block_size: Shape,
    /// Target ratio of input to output triangles for decimation.
    pub simplification_factor: f64,
    /// Largest geometric error a decimation step may introduce, in voxels.
    pub max_simplification_error: f64,
    /// Physical size of one voxel, x, y, z.
    pub voxel_size: [f32; 3],
    /// Place fragment vertices in volume coordinates instead of block-local
    /// coordinates.
    pub volume_coordinates: bool,
    /// Formats written per fragment. OBJ is always written.
    pub fragment_formats: Vec<MeshFormat>,
    /// Formats written per combined object.
    pub combined_formats: Vec<MeshFormat>,
    /// Number of blocks meshed concurrently.
    pub parallelism: usize,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            block_size: [512, 512, 512],
            simplification_factor: 100.0,
            max_simplification_error: 20.0,
            voxel_size: [1.0, 1.0, 1.0],
            volume_coordinates: false,
            fragment_formats: vec![MeshFormat::Obj, MeshFormat::Stl],
            combined_formats: vec![MeshFormat::Obj, MeshFormat::Stl],
            parallelism: 4,
        }
    }
}

impl MeshingConfig {
    pub fn with_block_size(mut self, block_size: Shape) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_simplification(mut self, factor: f64, max_error: f64) -> Self {
        self.simplification_factor = factor;
        self.max_simplification_error = max_error;
        self
    }

    pub fn with_voxel_size(mut self, voxel_size: [f32; 3]) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn with_volume_coordinates(mut self, enabled: bool) -> Self {
        self.volume_coordinates = enabled;
        self
    }

    pub fn with_fragment_formats(mut self, formats: Vec<MeshFormat>) -> Self {
        self.fragment_formats = formats;
        self
    }

    pub fn with_combined_formats(mut self, formats: Vec<MeshFormat>) -> Self {
        self.combined_formats = formats;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.simplification_factor > 0.0) {
            return Err(VolumeError::InvalidConfig(format!(
                "simplification factor must be positive, got {}",
                self.simplification_factor
            )));
        }
        if self.max_simplification_error < 0.0 {
            return Err(VolumeError::InvalidConfig(format!(
                "max simplification error must not be negative, got {}",
                self.max_simplification_error
            )));
        }
        if self.voxel_size.iter().any(|s| !(*s > 0.0)) {
            return Err(VolumeError::InvalidConfig(format!(
                "voxel size must be positive, got {:?}",
                self.voxel_size
            )));
        }
        if self.combined_formats.is_empty() {
            return Err(VolumeError::InvalidConfig(
                "at least one combined mesh format is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Phase of a meshing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshRunState {
    Planning,
    MeshingBlocks,
    Combining,
    Done,
}

impl fmt::Display for MeshRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeshRunState::Planning => "planning",
            MeshRunState::MeshingBlocks => "meshing blocks",
            MeshRunState::Combining => "combining",
            MeshRunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Summary of a completed meshing run.
#[derive(Debug)]
pub struct MeshRunReport {
    pub blocks: usize,
    pub fragments: usize,
    /// Objects whose combined meshes were written.
    pub combined: Vec<ObjectId>,
    /// Objects seen in some block that produced no surface.
    pub skipped: Vec<ObjectId>,
    /// Objects whose combine failed, with the error.
    pub failed: Vec<(ObjectId, VolumeError)>,
}

/// Meshes every object of a label volume into `output_dir`.
pub struct ChunkedMesher<'a, T> {
    provider: &'a VolumeProvider<T>,
    output_dir: PathBuf,
    config: MeshingConfig,
    state: Mutex<MeshRunState>,
}

impl<'a, T: Voxel> ChunkedMesher<'a, T> {
    pub fn new(provider: &'a VolumeProvider<T>, output_dir: impl AsRef<Path>, config: MeshingConfig) -> Self {
        Self {
            provider,
            output_dir: output_dir.as_ref().to_path_buf(),
            config,
            state: Mutex::new(MeshRunState::Planning),
        }
    }

    pub fn config(&self) -> &MeshingConfig {
        &self.config
    }

    pub fn state(&self) -> MeshRunState {
        *self.state.lock()
    }

    fn enter(&self, state: MeshRunState) {
        log::info!("Meshing: {}", state);
        *self.state.lock() = state;
    }

    /// Mesh all blocks, then combine the fragments of every object seen.
    ///
    /// Progress is reported once per block. A failing block aborts the run
    /// with a `Block` error; objects failing to combine are listed in the
    /// report instead.
    pub fn run(&self, progress: Option<ProgressCallback<'_>>) -> Result<MeshRunReport> {
        self.enter(MeshRunState::Planning);
        self.config.validate()?;
        let planner = BlockPlanner::new(self.provider.shape(), self.config.block_size)?;
        let pool = WorkerPool::new(self.config.parallelism)?;
        let store = FragmentStore::create(&self.output_dir, &self.config.fragment_formats)?;
        let blocks: Vec<Block> = planner.blocks().collect();
        log::info!(
            "Meshing {:?} volume in {} blocks of {:?} into {:?}",
            self.provider.shape(),
            blocks.len(),
            self.config.block_size,
            self.output_dir
        );

        self.enter(MeshRunState::MeshingBlocks);
        let reporter = ProgressReporter::new(blocks.len(), progress);
        pool.try_for_each(&blocks, |block| {
            self.mesh_block(block, &store).map_err(|e| e.in_block(block.extent))?;
            reporter.advance();
            Ok(())
        })?;

        self.enter(MeshRunState::Combining);
        let combined = combine_all(&store, &self.config.combined_formats, &pool)?;

        self.enter(MeshRunState::Done);
        log::info!(
            "Combined {} objects ({} skipped, {} failed)",
            combined.combined.len(),
            combined.skipped.len(),
            combined.failed.len()
        );
        Ok(MeshRunReport {
            blocks: blocks.len(),
            fragments: store.fragment_count(),
            combined: combined.combined,
            skipped: combined.skipped,
            failed: combined.failed,
        })
    }

    fn mesh_block(&self, block: &Block, store: &FragmentStore) -> Result<()> {
        let labels = self.provider.read(&block.extent)?;
        let objects = object_bounds(&labels);
        log::debug!(
            "Block {:?} ({}): {} objects",
            block.index,
            block.extent,
            objects.len()
        );

        for (&id, bounds) in &objects {
            let region = bounds.grown(1).clip(labels.shape());
            let mesh = self.mesh_object(&labels, id, &region, &block.extent);
            store.mark_seen(id);
            if mesh.is_empty() {
                continue;
            }
            store.write(FragmentKey::new(id, &block.extent), &mesh)?;
        }
        Ok(())
    }

    fn mesh_object(&self, labels: &Volume<T>, id: ObjectId, region: &Extent, block: &Extent) -> Mesh {
        let surface = extract_surface(labels, id, region);
        let mut mesh = simplify(
            &surface,
            self.config.simplification_factor,
            self.config.max_simplification_error,
        );
        log::debug!(
            "Object {} in {}: {} -> {} triangles",
            id,
            block,
            surface.triangle_count(),
            mesh.triangle_count()
        );

        if self.config.volume_coordinates {
            let [z, y, x] = block.origin();
            mesh.translate([x as f32, y as f32, z as f32]);
        }
        if self.config.voxel_size != [1.0, 1.0, 1.0] {
            mesh.scale(self.config.voxel_size);
        }
        // Vertex order as an OBJ reader hands it back.
        mesh.compact();
        mesh
    }
}

/// Inclusive voxel bounds of one object, Z, Y, X.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    min: [usize; 3],
    max: [usize; 3],
}

impl Bounds {
    fn grown(&self, margin: usize) -> Extent {
        Extent::new(
            (self.min[0].saturating_sub(margin), self.max[0] + 1 + margin),
            (self.min[1].saturating_sub(margin), self.max[1] + 1 + margin),
            (self.min[2].saturating_sub(margin), self.max[2] + 1 + margin),
        )
    }
}

/// Every non-background label in `labels` with its bounds, ascending by id.
fn object_bounds<T: Voxel>(labels: &Volume<T>) -> BTreeMap<ObjectId, Bounds> {
    let [depth, height, width] = labels.shape();
    let mut objects: BTreeMap<ObjectId, Bounds> = BTreeMap::new();
    let mut values = labels.as_slice().iter();

    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                let Some(id) = values.next().map(|&v| v.to_label()) else {
                    return objects;
                };
                if id == BACKGROUND {
                    continue;
                }
                let p = [z, y, x];
                objects
                    .entry(id)
                    .and_modify(|b| {
                        for axis in 0..3 {
                            b.min[axis] = b.min[axis].min(p[axis]);
                            b.max[axis] = b.max[axis].max(p[axis]);
                        }
                    })
                    .or_insert(Bounds { min: p, max: p });
            }
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::read_obj;
    use crate::types::Progress;
    use std::fs;
    use tempfile::TempDir;

    fn fill_box(volume: &mut Volume<u32>, extent: Extent, id: u32) {
        for z in extent.z.start..extent.z.stop {
            for y in extent.y.start..extent.y.stop {
                for x in extent.x.start..extent.x.stop {
                    volume.set([z, y, x], id);
                }
            }
        }
    }

    /// Two boxes: label 1 inside the first block, label 2 spanning both.
    fn two_labels() -> Volume<u32> {
        let mut volume = Volume::new([8, 8, 16]);
        fill_box(&mut volume, Extent::new((2, 6), (2, 6), (2, 6)), 1);
        fill_box(&mut volume, Extent::new((1, 7), (1, 7), (6, 13)), 2);
        volume
    }

    fn config() -> MeshingConfig {
        MeshingConfig::default()
            .with_block_size([8, 8, 8])
            .with_simplification(1.0, 0.0)
            .with_parallelism(2)
    }

    #[test]
    fn test_object_bounds() {
        let objects = object_bounds(&two_labels());
        assert_eq!(objects.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            objects[&2],
            Bounds {
                min: [1, 1, 6],
                max: [6, 6, 12]
            }
        );
        assert_eq!(objects[&2].grown(1).clip([8, 8, 16]), Extent::new((0, 8), (0, 8), (5, 14)));
    }

    #[test]
    fn test_end_to_end_two_labels() {
        let dir = TempDir::new().unwrap();
        let provider = VolumeProvider::from(two_labels());
        let progress = Mutex::new(Vec::new());
        let callback = |p: Progress| progress.lock().push(p.completed);

        let mesher = ChunkedMesher::new(&provider, dir.path(), config());
        assert_eq!(mesher.state(), MeshRunState::Planning);
        let report = mesher.run(Some(&callback)).unwrap();

        assert_eq!(mesher.state(), MeshRunState::Done);
        assert_eq!(report.blocks, 2);
        assert_eq!(report.fragments, 3);
        assert_eq!(report.combined, vec![1, 2]);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(progress.lock().len(), 2);

        for name in [
            "_1_0_0_0.obj",
            "_1_0_0_0.stl",
            "_2_0_0_0.obj",
            "_2_8_0_0.obj",
            "1.combined.obj",
            "1.combined.stl",
            "2.combined.obj",
            "2.combined.stl",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
        assert!(!dir.path().join("_1_8_0_0.obj").exists());

        // Label 2 is cut at the block seam, so both halves are open there and
        // their combination has exactly the triangles of both fragments.
        let left = read_obj(&dir.path().join("_2_0_0_0.obj")).unwrap();
        let right = read_obj(&dir.path().join("_2_8_0_0.obj")).unwrap();
        let combined = read_obj(&dir.path().join("2.combined.obj")).unwrap();
        assert_eq!(combined.triangle_count(), left.triangle_count() + right.triangle_count());
        assert_eq!(combined.vertex_count(), left.vertex_count() + right.vertex_count());
    }

    #[test]
    fn test_single_block_default_simplification() {
        let mut volume = Volume::<u32>::new([4, 4, 4]);
        volume.set([1, 1, 1], 1);
        fill_box(&mut volume, Extent::new((1, 3), (1, 3), (3, 4)), 2);
        let provider = VolumeProvider::from(volume);
        let dir = TempDir::new().unwrap();

        let config = MeshingConfig::default().with_block_size([4, 4, 4]).with_parallelism(1);
        let report = ChunkedMesher::new(&provider, dir.path(), config).run(None).unwrap();

        assert_eq!(report.blocks, 1);
        assert_eq!(report.combined, vec![1, 2]);
        for id in [1, 2] {
            let mesh = read_obj(&dir.path().join(format!("{}.combined.obj", id))).unwrap();
            assert!(mesh.vertex_count() > 0);
            assert!(mesh.triangle_count() > 0);
        }
        assert!(!dir.path().join("0.combined.obj").exists());
    }

    #[test]
    fn test_fragments_local_or_volume_coordinates() {
        let provider = VolumeProvider::from(two_labels());

        let local_dir = TempDir::new().unwrap();
        ChunkedMesher::new(&provider, local_dir.path(), config())
            .run(None)
            .unwrap();
        let (min, _) = read_obj(&local_dir.path().join("_2_8_0_0.obj"))
            .unwrap()
            .bounds()
            .unwrap();
        assert!(min[0] < 1.0);

        let global_dir = TempDir::new().unwrap();
        ChunkedMesher::new(&provider, global_dir.path(), config().with_volume_coordinates(true))
            .run(None)
            .unwrap();
        let (min, _) = read_obj(&global_dir.path().join("_2_8_0_0.obj"))
            .unwrap()
            .bounds()
            .unwrap();
        assert!(min[0] >= 8.0);
    }

    #[test]
    fn test_voxel_size_scales_positions() {
        let mut volume = Volume::<u32>::new([4, 4, 4]);
        fill_box(&mut volume, Extent::new((1, 3), (1, 3), (1, 3)), 5);
        let provider = VolumeProvider::from(volume);
        let dir = TempDir::new().unwrap();

        ChunkedMesher::new(&provider, dir.path(), config().with_voxel_size([1.0, 1.0, 4.0]))
            .run(None)
            .unwrap();
        let (min, max) = read_obj(&dir.path().join("5.combined.obj"))
            .unwrap()
            .bounds()
            .unwrap();
        assert!((max[2] - min[2]) > 3.0 * (max[0] - min[0]));
    }

    #[test]
    fn test_object_without_surface_is_skipped() {
        // A one-voxel-thick volume has no lattice cells, so the object is seen
        // but never produces a fragment.
        let provider = VolumeProvider::from(Volume::<u32>::filled([1, 4, 4], 3));
        let dir = TempDir::new().unwrap();
        let report = ChunkedMesher::new(&provider, dir.path(), config()).run(None).unwrap();

        assert_eq!(report.fragments, 0);
        assert!(report.combined.is_empty());
        assert_eq!(report.skipped, vec![3]);
        assert!(!dir.path().join("3.combined.obj").exists());
    }

    #[test]
    fn test_invalid_config() {
        let provider = VolumeProvider::from(two_labels());
        let dir = TempDir::new().unwrap();
        let result = ChunkedMesher::new(&provider, dir.path(), config().with_simplification(0.0, 1.0)).run(None);
        assert!(matches!(result, Err(VolumeError::InvalidConfig(_))));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_single_block_combined_matches_fragment() {
        let mut volume = Volume::<u32>::new([4, 4, 4]);
        volume.set([1, 1, 1], 1);
        fill_box(&mut volume, Extent::new((1, 3), (1, 3), (3, 4)), 2);
        let provider = VolumeProvider::from(volume);
        let dir = TempDir::new().unwrap();

        let config = MeshingConfig::default().with_block_size([4, 4, 4]).with_parallelism(1);
        let report = ChunkedMesher::new(&provider, dir.path(), config).run(None).unwrap();
        assert_eq!(report.fragments, 2);
        assert!(report.skipped.is_empty());

        // Only the object name line differs.
        let body = |name: &str| -> Vec<String> {
            fs::read_to_string(dir.path().join(name))
                .unwrap()
                .lines()
                .filter(|line| !line.starts_with("o "))
                .map(str::to_string)
                .collect()
        };
        for id in [1, 2] {
            let fragment = body(&format!("_{}_0_0_0.obj", id));
            assert_eq!(body(&format!("{}.combined.obj", id)), fragment);
            assert!(fragment.iter().any(|line| line.starts_with("f ")));
        }
    }
}
