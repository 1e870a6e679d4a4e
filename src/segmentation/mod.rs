//! Segmentation of volumes into integer object labels.

mod writer;

pub use writer::{ChunkedSegmentationWriter, SegmentationConfig};

use crate::error::{Result, VolumeError};
use crate::types::{ObjectId, Volume, Voxel};
use std::collections::VecDeque;

/// Turns a sub-volume into a label volume of the same shape.
///
/// The writer calls this once per Z plane, with a volume of shape
/// `[1, height, width]`. Implementations must be safe to call concurrently.
pub trait Segmenter<T>: Send + Sync {
    fn segment(&self, volume: &Volume<T>) -> Result<Volume<ObjectId>>;
}

impl<T, F> Segmenter<T> for F
where
    F: Fn(&Volume<T>) -> Result<Volume<ObjectId>> + Send + Sync,
{
    fn segment(&self, volume: &Volume<T>) -> Result<Volume<ObjectId>> {
        self(volume)
    }
}

/// Labels every voxel above `threshold` as object 1.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdSegmenter {
    pub threshold: f64,
}

impl ThresholdSegmenter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl<T: Voxel> Segmenter<T> for ThresholdSegmenter {
    fn segment(&self, volume: &Volume<T>) -> Result<Volume<ObjectId>> {
        Ok(volume.map(|v| (v.to_f64() > self.threshold) as ObjectId))
    }
}

/// Thresholds, then numbers the 6-connected foreground components 1, 2, ...
/// in scan order.
///
/// Labels restart at 1 on every call. When used through the chunked writer
/// the same number can therefore denote different objects in different
/// blocks or slices; no global relabeling is applied.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedComponentsSegmenter {
    pub threshold: f64,
}

impl ConnectedComponentsSegmenter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl<T: Voxel> Segmenter<T> for ConnectedComponentsSegmenter {
    fn segment(&self, volume: &Volume<T>) -> Result<Volume<ObjectId>> {
        let shape = volume.shape();
        let foreground: Vec<bool> = volume
            .as_slice()
            .iter()
            .map(|v| v.to_f64() > self.threshold)
            .collect();

        let mut labels = Volume::<ObjectId>::new(shape);
        let mut next_label: ObjectId = 1;
        let mut queue = VecDeque::new();

        for z in 0..shape[0] {
            for y in 0..shape[1] {
                for x in 0..shape[2] {
                    let offset = (z * shape[1] + y) * shape[2] + x;
                    if !foreground[offset] || labels.as_slice()[offset] != 0 {
                        continue;
                    }

                    let label = next_label;
                    next_label = next_label.checked_add(1).ok_or_else(|| {
                        VolumeError::Segmentation("label space exhausted".to_string())
                    })?;
                    labels.set([z, y, x], label);
                    queue.push_back([z, y, x]);

                    while let Some(p) = queue.pop_front() {
                        for q in face_neighbors(p, shape) {
                            let offset = (q[0] * shape[1] + q[1]) * shape[2] + q[2];
                            if foreground[offset] && labels.as_slice()[offset] == 0 {
                                labels.set(q, label);
                                queue.push_back(q);
                            }
                        }
                    }
                }
            }
        }
        Ok(labels)
    }
}

/// The up to six face-adjacent positions of `p` inside `shape`.
fn face_neighbors(p: [usize; 3], shape: [usize; 3]) -> impl Iterator<Item = [usize; 3]> {
    (0..3).flat_map(move |axis| {
        let below = (p[axis] > 0).then(|| {
            let mut q = p;
            q[axis] -= 1;
            q
        });
        let above = (p[axis] + 1 < shape[axis]).then(|| {
            let mut q = p;
            q[axis] += 1;
            q
        });
        below.into_iter().chain(above)
    })
}
