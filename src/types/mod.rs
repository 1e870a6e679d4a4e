//! Shared types used throughout the library.
//!
//! All shapes, extents and indices are stored in Z, Y, X order (slowest to
//! fastest varying). User-facing indexing in [`address`] takes X, Y, Z and
//! translates.

pub mod address;
mod volume;
mod voxel;

pub use address::{normalize, AxisIndex, VolumeIndex};
pub use volume::Volume;
pub use voxel::{DataType, Voxel};

use std::fmt;

/// Integer label identifying one segmented object. `0` is background.
pub type ObjectId = u64;

/// Label value reserved for background.
pub const BACKGROUND: ObjectId = 0;

/// Shape of a 3D array in Z, Y, X order.
pub type Shape = [usize; 3];

/// A half-open `start..stop` range along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisRange {
    pub start: usize,
    pub stop: usize,
}

impl AxisRange {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    /// Overlap of two ranges, or `None` if they are disjoint.
    pub fn intersect(&self, other: &AxisRange) -> Option<AxisRange> {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        (stop > start).then_some(AxisRange { start, stop })
    }
}

/// A rectangular sub-region of a volume: one range per axis, Z, Y, X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub z: AxisRange,
    pub y: AxisRange,
    pub x: AxisRange,
}

impl Extent {
    /// Build an extent from `(start, stop)` pairs in Z, Y, X order.
    pub fn new(z: (usize, usize), y: (usize, usize), x: (usize, usize)) -> Self {
        Self {
            z: AxisRange::new(z.0, z.1),
            y: AxisRange::new(y.0, y.1),
            x: AxisRange::new(x.0, x.1),
        }
    }

    /// Build an extent from its lower corner and its shape.
    pub fn from_origin_shape(origin: [usize; 3], shape: Shape) -> Self {
        Self::new(
            (origin[0], origin[0] + shape[0]),
            (origin[1], origin[1] + shape[1]),
            (origin[2], origin[2] + shape[2]),
        )
    }

    /// The extent covering a whole array of the given shape.
    pub fn full(shape: Shape) -> Self {
        Self::from_origin_shape([0, 0, 0], shape)
    }

    /// The per-axis ranges in Z, Y, X order.
    pub fn axes(&self) -> [AxisRange; 3] {
        [self.z, self.y, self.x]
    }

    fn from_axes(axes: [AxisRange; 3]) -> Self {
        Self {
            z: axes[0],
            y: axes[1],
            x: axes[2],
        }
    }

    /// Number of voxels along each axis.
    pub fn shape(&self) -> Shape {
        [self.z.len(), self.y.len(), self.x.len()]
    }

    /// Lower corner in Z, Y, X order.
    pub fn origin(&self) -> [usize; 3] {
        [self.z.start, self.y.start, self.x.start]
    }

    pub fn voxel_count(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.axes().iter().any(AxisRange::is_empty)
    }

    /// Whether the extent lies entirely inside `[0, shape)`.
    pub fn fits_within(&self, shape: Shape) -> bool {
        self.axes()
            .iter()
            .zip(shape)
            .all(|(range, size)| range.stop <= size)
    }

    /// Clip the extent to `[0, shape)`.
    pub fn clip(&self, shape: Shape) -> Extent {
        let mut axes = self.axes();
        for (range, size) in axes.iter_mut().zip(shape) {
            range.stop = range.stop.min(size);
            range.start = range.start.min(range.stop);
        }
        Self::from_axes(axes)
    }

    /// Overlap of two extents, or `None` if they are disjoint on any axis.
    pub fn intersect(&self, other: &Extent) -> Option<Extent> {
        let a = self.axes();
        let b = other.axes();
        Some(Self::from_axes([
            a[0].intersect(&b[0])?,
            a[1].intersect(&b[1])?,
            a[2].intersect(&b[2])?,
        ]))
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.intersect(other).is_some()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z={}..{} y={}..{} x={}..{}",
            self.z.start, self.z.stop, self.y.start, self.y.stop, self.x.start, self.x.stop
        )
    }
}

/// Progress of a block-wise operation, reported after each unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completed fraction in `[0, 1]`. An empty run counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}
