//! Spatial decomposition of a volume into processing blocks.

use crate::error::{Result, VolumeError};
use crate::types::{Extent, Shape};

/// One unit of block-wise work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub extent: Extent,
    /// Position in the block grid, Z, Y, X.
    pub index: [usize; 3],
}

/// Splits a volume into a grid of blocks.
///
/// Blocks are yielded row-major by (Z, Y, X) grid index. The last block on
/// each axis is clipped to the volume rather than padded. Without overlap the
/// blocks are pairwise disjoint and cover every voxel exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlanner {
    shape: Shape,
    block_size: Shape,
    overlap: Shape,
}

impl BlockPlanner {
    pub fn new(shape: Shape, block_size: Shape) -> Result<Self> {
        if block_size.contains(&0) {
            return Err(VolumeError::InvalidConfig(format!(
                "block size must be positive, got {:?}",
                block_size
            )));
        }
        Ok(Self {
            shape,
            block_size,
            overlap: [0, 0, 0],
        })
    }

    /// Extend each block by `overlap` voxels on its upper side (clipped).
    pub fn with_overlap(mut self, overlap: Shape) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn block_size(&self) -> Shape {
        self.block_size
    }

    /// Number of blocks along each axis.
    pub fn grid(&self) -> Shape {
        [0, 1, 2].map(|i| self.shape[i].div_ceil(self.block_size[i]))
    }

    pub fn len(&self) -> usize {
        self.grid().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The block at grid position `index`.
    pub fn block(&self, index: [usize; 3]) -> Block {
        let origin = [0, 1, 2].map(|i| index[i] * self.block_size[i]);
        let size = [0, 1, 2].map(|i| self.block_size[i] + self.overlap[i]);
        Block {
            extent: Extent::from_origin_shape(origin, size).clip(self.shape),
            index,
        }
    }

    /// Iterate all blocks. Each call starts a fresh pass.
    pub fn blocks(&self) -> Blocks {
        Blocks {
            planner: *self,
            grid: self.grid(),
            next: 0,
            total: self.len(),
        }
    }
}

/// Iterator over the blocks of a [`BlockPlanner`].
#[derive(Debug, Clone)]
pub struct Blocks {
    planner: BlockPlanner,
    grid: Shape,
    next: usize,
    total: usize,
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.next >= self.total {
            return None;
        }
        let i = self.next;
        self.next += 1;

        let x = i % self.grid[2];
        let y = (i / self.grid[2]) % self.grid[1];
        let z = i / (self.grid[2] * self.grid[1]);
        Some(self.planner.block([z, y, x]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Blocks {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clipped_last_block() {
        let planner = BlockPlanner::new([10, 10, 10], [4, 4, 4]).unwrap();
        assert_eq!(planner.len(), 27);

        let blocks: Vec<_> = planner.blocks().collect();
        assert_eq!(blocks.len(), 27);
        assert_eq!(blocks[0].extent, Extent::new((0, 4), (0, 4), (0, 4)));
        assert_eq!(blocks[26].extent, Extent::new((8, 10), (8, 10), (8, 10)));
        assert_eq!(blocks[26].index, [2, 2, 2]);
    }

    #[test]
    fn test_row_major_order() {
        let planner = BlockPlanner::new([2, 2, 2], [1, 1, 1]).unwrap();
        let indices: Vec<_> = planner.blocks().map(|b| b.index).collect();
        assert_eq!(indices[0], [0, 0, 0]);
        assert_eq!(indices[1], [0, 0, 1]);
        assert_eq!(indices[2], [0, 1, 0]);
        assert_eq!(indices[4], [1, 0, 0]);
    }

    #[test]
    fn test_zero_dimension_is_empty() {
        let planner = BlockPlanner::new([0, 10, 10], [4, 4, 4]).unwrap();
        assert!(planner.is_empty());
        assert_eq!(planner.blocks().count(), 0);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            BlockPlanner::new([10, 10, 10], [4, 0, 4]),
            Err(VolumeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overlap_extends_and_clips() {
        let planner = BlockPlanner::new([10, 10, 10], [4, 4, 4])
            .unwrap()
            .with_overlap([1, 1, 1]);
        let blocks: Vec<_> = planner.blocks().collect();
        assert_eq!(blocks[0].extent, Extent::new((0, 5), (0, 5), (0, 5)));
        assert_eq!(blocks[26].extent, Extent::new((8, 10), (8, 10), (8, 10)));
    }

    #[test]
    fn test_restartable() {
        let planner = BlockPlanner::new([5, 5, 5], [2, 3, 4]).unwrap();
        let first: Vec<_> = planner.blocks().collect();
        let second: Vec<_> = planner.blocks().collect();
        assert_eq!(first, second);
        assert_eq!(planner.blocks().len(), first.len());
    }

    proptest! {
        #[test]
        fn blocks_partition_the_volume(
            shape in prop::array::uniform3(1usize..12),
            block_size in prop::array::uniform3(1usize..6),
        ) {
            let planner = BlockPlanner::new(shape, block_size).unwrap();
            let mut coverage = vec![0u8; shape.iter().product()];

            for block in planner.blocks() {
                prop_assert!(!block.extent.is_empty());
                prop_assert!(block.extent.fits_within(shape));
                for z in block.extent.z.start..block.extent.z.stop {
                    for y in block.extent.y.start..block.extent.y.stop {
                        for x in block.extent.x.start..block.extent.x.stop {
                            coverage[(z * shape[1] + y) * shape[2] + x] += 1;
                        }
                    }
                }
            }
            prop_assert!(coverage.iter().all(|&c| c == 1));

            let expected: usize = (0..3).map(|i| shape[i].div_ceil(block_size[i])).product();
            prop_assert_eq!(planner.len(), expected);
        }
    }
}
