//! Block-parallel segmentation into a chunked label store.

use super::Segmenter;
use crate::error::{Result, VolumeError};
use crate::planner::{Block, BlockPlanner};
use crate::pool::WorkerPool;
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::provider::VolumeProvider;
use crate::store::ChunkedArray;
use crate::types::{ObjectId, Shape, Volume, Voxel, BACKGROUND};
use std::path::Path;

/// Configuration for a segmentation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    /// Size of each processing block.
    pub block_size: Shape,
    /// Chunk size of the label store. Defaults to the block size.
    pub chunk_size: Option<Shape>,
    /// Number of blocks processed concurrently.
    pub parallelism: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            block_size: [64, 64, 64],
            chunk_size: None,
            parallelism: 4,
        }
    }
}

impl SegmentationConfig {
    pub fn with_block_size(mut self, block_size: Shape) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: Shape) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

/// Segments a volume block by block and writes the labels to a chunked store.
///
/// Each block is segmented one Z plane at a time. Labels produced by the
/// segmenter are written as-is, so they are only unique within one call of the
/// segmenter.
pub struct ChunkedSegmentationWriter {
    config: SegmentationConfig,
}

impl ChunkedSegmentationWriter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Segment `source` into a new label array at `destination`.
    ///
    /// Any existing array at `destination` is replaced. The first failing block
    /// aborts the run with a `Block` error naming its extent; chunks written
    /// before the failure are left in place.
    pub fn run<T, S>(
        &self,
        source: &VolumeProvider<T>,
        destination: impl AsRef<Path>,
        segmenter: &S,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<ChunkedArray<ObjectId>>
    where
        T: Voxel,
        S: Segmenter<T> + ?Sized,
    {
        let shape = source.shape();
        let planner = BlockPlanner::new(shape, self.config.block_size)?;
        let chunk_size = self.config.chunk_size.unwrap_or(self.config.block_size);
        let pool = WorkerPool::new(self.config.parallelism)?;

        let labels = ChunkedArray::create(destination, shape, chunk_size, BACKGROUND)?;
        let blocks: Vec<Block> = planner.blocks().collect();
        log::info!(
            "Segmenting {:?} volume in {} blocks of {:?} with {} workers",
            shape,
            blocks.len(),
            self.config.block_size,
            pool.num_threads()
        );

        let reporter = ProgressReporter::new(blocks.len(), progress);
        pool.try_for_each(&blocks, |block| {
            segment_block(source, &labels, segmenter, block).map_err(|e| e.in_block(block.extent))?;
            reporter.advance();
            Ok(())
        })?;

        log::info!("Segmentation written to {:?}", labels.path());
        Ok(labels)
    }
}

fn segment_block<T, S>(
    source: &VolumeProvider<T>,
    labels: &ChunkedArray<ObjectId>,
    segmenter: &S,
    block: &Block,
) -> Result<()>
where
    T: Voxel,
    S: Segmenter<T> + ?Sized,
{
    log::debug!("Segmenting block {:?} ({})", block.index, block.extent);
    let data = source.read(&block.extent)?;
    let [depth, height, width] = data.shape();

    let mut output = Volume::<ObjectId>::new(data.shape());
    for z in 0..depth {
        let plane = Volume::from_vec([1, height, width], data.plane(z).to_vec())?;
        let segmented = segmenter.segment(&plane)?;
        if segmented.shape() != plane.shape() {
            return Err(VolumeError::ShapeMismatch {
                expected: plane.shape(),
                actual: segmented.shape(),
            });
        }
        output.plane_mut(z).copy_from_slice(segmented.as_slice());
    }

    labels.write_region(block.extent.origin(), &output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::ThresholdSegmenter;
    use crate::types::{Extent, Progress};
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    fn sphere(shape: Shape, center: [f64; 3], radius: f64) -> Volume<u8> {
        let mut volume = Volume::new(shape);
        for z in 0..shape[0] {
            for y in 0..shape[1] {
                for x in 0..shape[2] {
                    let d = [z as f64 - center[0], y as f64 - center[1], x as f64 - center[2]];
                    if d.iter().map(|v| v * v).sum::<f64>() <= radius * radius {
                        volume.set([z, y, x], 200);
                    }
                }
            }
        }
        volume
    }

    #[test]
    fn test_writes_labels_matching_threshold() {
        let dir = TempDir::new().unwrap();
        let volume = sphere([12, 12, 12], [6.0, 6.0, 6.0], 4.0);
        let provider = VolumeProvider::from(volume.clone());

        let writer = ChunkedSegmentationWriter::new(
            SegmentationConfig::default()
                .with_block_size([5, 5, 5])
                .with_parallelism(3),
        );
        let labels = writer
            .run(&provider, dir.path().join("labels"), &ThresholdSegmenter::new(100.0), None)
            .unwrap();

        let result = labels.read_region(&Extent::full([12, 12, 12])).unwrap();
        assert_eq!(result, volume.map(|v| (v > 100) as ObjectId));
    }

    #[test]
    fn test_sparse_output() {
        let dir = TempDir::new().unwrap();
        let mut volume = Volume::<u8>::new([8, 8, 8]);
        volume.set([0, 0, 0], 255);
        let provider = VolumeProvider::from(volume);

        let writer = ChunkedSegmentationWriter::new(SegmentationConfig::default().with_block_size([4, 4, 4]));
        let labels = writer
            .run(&provider, dir.path().join("labels"), &ThresholdSegmenter::new(0.0), None)
            .unwrap();

        assert_eq!(labels.stored_chunk_count().unwrap(), 1);
        assert!(dir.path().join("labels").join("0.0.0").exists());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels");
        let provider = VolumeProvider::from(sphere([6, 6, 6], [3.0, 3.0, 3.0], 2.5));
        let writer = ChunkedSegmentationWriter::new(SegmentationConfig::default().with_block_size([3, 3, 3]));
        let segmenter = ThresholdSegmenter::new(0.0);

        writer.run(&provider, &path, &segmenter, None).unwrap();
        let snapshot = |path: &Path| {
            let mut files: Vec<_> = fs::read_dir(path)
                .unwrap()
                .map(|e| {
                    let e = e.unwrap();
                    (e.file_name(), fs::read(e.path()).unwrap())
                })
                .collect();
            files.sort();
            files
        };
        let first = snapshot(&path);

        writer.run(&provider, &path, &segmenter, None).unwrap();
        assert_eq!(first, snapshot(&path));
    }

    #[test]
    fn test_chunk_size_independent_of_block_size() {
        let dir = TempDir::new().unwrap();
        let volume = sphere([10, 10, 10], [5.0, 5.0, 5.0], 3.0);
        let provider = VolumeProvider::from(volume.clone());

        let writer = ChunkedSegmentationWriter::new(
            SegmentationConfig::default()
                .with_block_size([3, 7, 4])
                .with_chunk_size([4, 4, 4]),
        );
        let labels = writer
            .run(&provider, dir.path().join("labels"), &ThresholdSegmenter::new(0.0), None)
            .unwrap();

        assert_eq!(labels.chunks(), [4, 4, 4]);
        let result = labels.read_region(&Extent::full([10, 10, 10])).unwrap();
        assert_eq!(result, volume.map(|v| (v > 0) as ObjectId));
    }

    #[test]
    fn test_progress_reported_per_block() {
        let dir = TempDir::new().unwrap();
        let provider = VolumeProvider::from(Volume::<u8>::new([4, 4, 4]));
        let seen = Mutex::new(Vec::new());
        let callback = |p: Progress| seen.lock().push(p);

        let writer = ChunkedSegmentationWriter::new(SegmentationConfig::default().with_block_size([2, 2, 4]));
        writer
            .run(&provider, dir.path().join("labels"), &ThresholdSegmenter::new(0.0), Some(&callback))
            .unwrap();

        let mut seen = seen.into_inner();
        seen.sort_by_key(|p| p.completed);
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|p| p.total == 4));
        assert_eq!(seen.last().map(|p| p.completed), Some(4));
    }

    #[test]
    fn test_block_failure_names_extent() {
        let dir = TempDir::new().unwrap();
        let provider = VolumeProvider::from(Volume::<u8>::new([4, 4, 4]));
        let segmenter = |_: &Volume<u8>| -> Result<Volume<ObjectId>> { Ok(Volume::new([1, 1, 1])) };

        let writer = ChunkedSegmentationWriter::new(SegmentationConfig::default().with_block_size([2, 4, 4]));
        let error = writer
            .run(&provider, dir.path().join("labels"), &segmenter, None)
            .unwrap_err();

        assert!(error.block_extent().is_some());
        match error {
            VolumeError::Block { source, .. } => {
                assert!(matches!(*source, VolumeError::ShapeMismatch { .. }))
            }
            other => panic!("unexpected error {}", other),
        }
    }
}
