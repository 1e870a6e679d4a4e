//! Normalization of user-facing slice requests into extents.
//!
//! A [`VolumeIndex`] is what a caller writes when asking a provider for data:
//! either a single Z slice or one index/range per axis in X, Y, Z order.
//! [`normalize`] resolves it against a shape into a canonical [`Extent`].

use super::{AxisRange, Extent, Shape};
use crate::error::{Result, VolumeError};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// One axis of a request: a single position or a half-open range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisIndex {
    Index(i64),
    Range { start: Option<i64>, stop: Option<i64> },
}

impl AxisIndex {
    /// The whole axis.
    pub const FULL: AxisIndex = AxisIndex::Range {
        start: None,
        stop: None,
    };

    fn resolve(self, size: usize, axis: &str) -> Result<AxisRange> {
        let (start, stop) = match self {
            AxisIndex::Index(i) => (Some(i), i.checked_add(1)),
            AxisIndex::Range { start, stop } => (start, stop),
        };

        let start = match start {
            Some(s) if s < 0 => {
                return Err(VolumeError::InvalidIndex(format!(
                    "negative start {} on axis {}",
                    s, axis
                )))
            }
            Some(s) => s as usize,
            None => 0,
        };
        let stop = match stop {
            Some(s) if s < 0 => {
                return Err(VolumeError::InvalidIndex(format!(
                    "negative stop {} on axis {}",
                    s, axis
                )))
            }
            Some(s) => (s as usize).min(size),
            None => size,
        };

        if stop <= start {
            return Err(VolumeError::InvalidIndex(format!(
                "empty range {}..{} on axis {} of size {}",
                start, stop, axis, size
            )));
        }
        Ok(AxisRange::new(start, stop))
    }
}

impl From<i64> for AxisIndex {
    fn from(i: i64) -> Self {
        AxisIndex::Index(i)
    }
}

impl From<Range<i64>> for AxisIndex {
    fn from(r: Range<i64>) -> Self {
        AxisIndex::Range {
            start: Some(r.start),
            stop: Some(r.end),
        }
    }
}

impl From<RangeFrom<i64>> for AxisIndex {
    fn from(r: RangeFrom<i64>) -> Self {
        AxisIndex::Range {
            start: Some(r.start),
            stop: None,
        }
    }
}

impl From<RangeTo<i64>> for AxisIndex {
    fn from(r: RangeTo<i64>) -> Self {
        AxisIndex::Range {
            start: None,
            stop: Some(r.end),
        }
    }
}

impl From<RangeFull> for AxisIndex {
    fn from(_: RangeFull) -> Self {
        AxisIndex::FULL
    }
}

/// A request for a sub-volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeIndex {
    /// A single full Z slice.
    Slice(i64),
    /// One index or range per axis, in X, Y, Z order.
    Axes([AxisIndex; 3]),
}

impl VolumeIndex {
    /// Build a per-axis request from X, Y, Z components.
    pub fn xyz(
        x: impl Into<AxisIndex>,
        y: impl Into<AxisIndex>,
        z: impl Into<AxisIndex>,
    ) -> Self {
        VolumeIndex::Axes([x.into(), y.into(), z.into()])
    }
}

impl From<i64> for VolumeIndex {
    fn from(z: i64) -> Self {
        VolumeIndex::Slice(z)
    }
}

/// Resolve `index` against `shape` (Z, Y, X) into an extent.
///
/// Missing bounds default to the full axis, stops past the end are clamped,
/// and negative or empty ranges are rejected with `InvalidIndex`.
pub fn normalize(index: &VolumeIndex, shape: Shape) -> Result<Extent> {
    let [x, y, z] = match *index {
        VolumeIndex::Slice(z) => [AxisIndex::FULL, AxisIndex::FULL, AxisIndex::Index(z)],
        VolumeIndex::Axes(axes) => axes,
    };

    Ok(Extent {
        z: z.resolve(shape[0], "z")?,
        y: y.resolve(shape[1], "y")?,
        x: x.resolve(shape[2], "x")?,
    })
}
