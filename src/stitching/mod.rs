//! Merging overlapping sub-images onto a shared canvas.

use crate::error::{Result, VolumeError};
use crate::types::{Extent, ObjectId, Shape, Volume, Voxel, BACKGROUND};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Strategy for placing images onto a canvas. Images are applied in order,
/// so later images take precedence where a strategy lets one value win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCombiner {
    /// Later pixels replace earlier ones.
    #[default]
    Overwrite,
    /// Sum of canvas and images, divided by the number of images.
    ///
    /// The divisor is the image count for every pixel, not the number of
    /// images covering it, so partially overlapped pixels are not a true
    /// average.
    Mean,
    /// Element-wise maximum.
    Max,
    /// Label union via [`join_segmentations`] with each image in turn.
    LabelUnion,
}

impl ImageCombiner {
    /// Combine `images` placed at `offsets` (Z, Y, X) onto `canvas`.
    ///
    /// Every image must fit inside the canvas at its offset.
    pub fn combine<T: Voxel>(&self, canvas: Volume<T>, images: &[Volume<T>], offsets: &[[usize; 3]]) -> Result<Volume<T>> {
        if images.len() != offsets.len() {
            return Err(VolumeError::InvalidIndex(format!(
                "{} images but {} offsets",
                images.len(),
                offsets.len()
            )));
        }
        for (image, &offset) in images.iter().zip(offsets) {
            let extent = Extent::from_origin_shape(offset, image.shape());
            if !extent.fits_within(canvas.shape()) {
                return Err(VolumeError::InvalidIndex(format!(
                    "image at {} outside canvas of shape {:?}",
                    extent,
                    canvas.shape()
                )));
            }
        }

        match self {
            ImageCombiner::Overwrite => {
                let mut canvas = canvas;
                for (image, &offset) in images.iter().zip(offsets) {
                    canvas.paste(offset, image)?;
                }
                Ok(canvas)
            }
            ImageCombiner::Mean => Ok(mean(canvas, images, offsets)),
            ImageCombiner::Max => {
                let mut canvas = canvas;
                for (image, &offset) in images.iter().zip(offsets) {
                    for_each_placed(image, offset, |target, value| {
                        if value > canvas.get(target) {
                            canvas.set(target, value);
                        }
                    });
                }
                Ok(canvas)
            }
            ImageCombiner::LabelUnion => {
                let mut joined = canvas.map(|v: T| v.to_label());
                for (image, &offset) in images.iter().zip(offsets) {
                    let mut layer = Volume::<ObjectId>::new(joined.shape());
                    layer.paste(offset, &image.map(|v: T| v.to_label()))?;
                    joined = join_segmentations(&joined, &layer)?;
                }
                Ok(joined.map(T::from_label))
            }
        }
    }
}

fn mean<T: Voxel>(canvas: Volume<T>, images: &[Volume<T>], offsets: &[[usize; 3]]) -> Volume<T> {
    if images.is_empty() {
        return canvas;
    }
    let [_, height, width] = canvas.shape();
    let mut sum: Vec<f64> = canvas.as_slice().iter().map(|v| v.to_f64()).collect();
    for (image, &offset) in images.iter().zip(offsets) {
        for_each_placed(image, offset, |[z, y, x], value| {
            sum[(z * height + y) * width + x] += value.to_f64();
        });
    }

    let divisor = images.len() as f64;
    let mut canvas = canvas;
    for (target, total) in canvas.as_mut_slice().iter_mut().zip(sum) {
        *target = T::from_f64(total / divisor);
    }
    canvas
}

/// Visit every value of `image` with its position on the canvas.
fn for_each_placed<T: Voxel>(image: &Volume<T>, offset: [usize; 3], mut f: impl FnMut([usize; 3], T)) {
    let [depth, height, width] = image.shape();
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                f([offset[0] + z, offset[1] + y, offset[2] + x], image.get([z, y, x]));
            }
        }
    }
}

/// Relabel `labels` to `1..=n` in ascending order of the original values,
/// keeping background.
fn relabel_sequential(labels: &Volume<ObjectId>) -> Volume<ObjectId> {
    let unique: BTreeSet<ObjectId> = labels.as_slice().iter().copied().filter(|&v| v != BACKGROUND).collect();
    let mapping: BTreeMap<ObjectId, ObjectId> = unique.into_iter().zip(1..).collect();
    labels.map(|v: ObjectId| if v == BACKGROUND { BACKGROUND } else { mapping[&v] })
}

/// Join two segmentations of the same shape: every distinct pair of labels
/// becomes one output label, numbered `1..` in ascending pair order. The
/// output is background only where both inputs are.
pub fn join_segmentations(a: &Volume<ObjectId>, b: &Volume<ObjectId>) -> Result<Volume<ObjectId>> {
    if a.shape() != b.shape() {
        return Err(VolumeError::ShapeMismatch {
            expected: a.shape(),
            actual: b.shape(),
        });
    }
    let a = relabel_sequential(a);
    let b = relabel_sequential(b);

    let pairs: Vec<(ObjectId, ObjectId)> = a.as_slice().iter().copied().zip(b.as_slice().iter().copied()).collect();
    let unique: BTreeSet<(ObjectId, ObjectId)> = pairs
        .iter()
        .copied()
        .filter(|&pair| pair != (BACKGROUND, BACKGROUND))
        .collect();
    let mapping: BTreeMap<(ObjectId, ObjectId), ObjectId> = unique.into_iter().zip(1..).collect();

    let joined = pairs
        .into_iter()
        .map(|pair| mapping.get(&pair).copied().unwrap_or(BACKGROUND))
        .collect();
    Volume::from_vec(a.shape(), joined)
}

/// Stitches images placed at integer origins relative to a primary image.
#[derive(Debug, Clone)]
pub struct AlignedStitcher<T> {
    image: Volume<T>,
    combiner: ImageCombiner,
}

impl<T: Voxel> AlignedStitcher<T> {
    pub fn new(image: Volume<T>, combiner: ImageCombiner) -> Self {
        Self { image, combiner }
    }

    pub fn image(&self) -> &Volume<T> {
        &self.image
    }

    pub fn into_image(self) -> Volume<T> {
        self.image
    }

    /// Place `others` at `origins` (Z, Y, X, relative to the primary image's
    /// lower corner, possibly negative). The canvas grows to cover every
    /// image. Only one other image per call is supported.
    pub fn stitch(&self, others: &[Volume<T>], origins: &[[i64; 3]]) -> Result<AlignedStitcher<T>> {
        if others.len() != 1 || origins.len() != 1 {
            return Err(VolumeError::NotImplemented(format!(
                "stitching {} images at {} origins; exactly one is supported",
                others.len(),
                origins.len()
            )));
        }
        let other_shape = others[0].shape();
        let origin = origins[0];
        let own_shape = self.image.shape();

        let mut min_origin = [0i64; 3];
        let mut canvas_shape: Shape = [0; 3];
        for axis in 0..3 {
            min_origin[axis] = origin[axis].min(0);
            let max_end = (origin[axis] + other_shape[axis] as i64).max(own_shape[axis] as i64);
            canvas_shape[axis] = (max_end - min_origin[axis]) as usize;
        }
        let own_position = min_origin.map(|m| (-m) as usize);
        let positions: Vec<[usize; 3]> = origins
            .iter()
            .map(|o| [0, 1, 2].map(|axis| (o[axis] - min_origin[axis]) as usize))
            .collect();
        log::debug!(
            "Stitching {:?} at {:?} onto canvas {:?}",
            other_shape,
            origin,
            canvas_shape
        );

        let mut canvas = Volume::new(canvas_shape);
        canvas.paste(own_position, &self.image)?;
        let image = self.combiner.combine(canvas, others, &positions)?;
        Ok(AlignedStitcher::new(image, self.combiner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(shape: [usize; 2], value: u8) -> Volume<u8> {
        Volume::filled([1, shape[0], shape[1]], value)
    }

    #[test]
    fn test_overwrite() {
        let canvas = plane([10, 10], 0);
        let result = ImageCombiner::Overwrite
            .combine(canvas, &[plane([5, 5], 1)], &[[0, 2, 2]])
            .unwrap();
        for y in 0..10 {
            for x in 0..10 {
                let inside = (2..7).contains(&y) && (2..7).contains(&x);
                assert_eq!(result.get([0, y, x]), inside as u8, "at {} {}", y, x);
            }
        }
    }

    #[test]
    fn test_image_outside_canvas() {
        let result = ImageCombiner::Max.combine(plane([4, 4], 0), &[plane([2, 2], 1)], &[[0, 3, 0]]);
        assert!(matches!(result, Err(VolumeError::InvalidIndex(_))));
        let result = ImageCombiner::Max.combine(plane([4, 4], 0), &[plane([2, 2], 1)], &[]);
        assert!(matches!(result, Err(VolumeError::InvalidIndex(_))));
    }

    #[test]
    fn test_mean_divides_by_image_count() {
        let canvas = Volume::<f32>::filled([1, 1, 4], 2.0);
        let images = [Volume::filled([1, 1, 2], 4.0), Volume::filled([1, 1, 2], 6.0)];
        let result = ImageCombiner::Mean.combine(canvas, &images, &[[0, 0, 0], [0, 0, 1]]).unwrap();

        // Every pixel is divided by 2, including those no image covers.
        assert_eq!(result.as_slice(), &[3.0, 6.0, 4.0, 1.0]);
    }

    #[test]
    fn test_max() {
        let mut canvas = plane([1, 3], 5);
        canvas.set([0, 0, 2], 0);
        let result = ImageCombiner::Max
            .combine(canvas, &[plane([1, 2], 3)], &[[0, 0, 1]])
            .unwrap();
        assert_eq!(result.as_slice(), &[5, 5, 3]);
    }

    #[test]
    fn test_join_segmentations() {
        let a = Volume::from_vec([1, 1, 6], vec![0, 0, 7, 7, 9, 9]).unwrap();
        let b = Volume::from_vec([1, 1, 6], vec![0, 4, 0, 4, 4, 0]).unwrap();
        let joined = join_segmentations(&a, &b).unwrap();
        // Pairs after relabeling: (0,0) (0,1) (1,0) (1,1) (2,1) (2,0)
        assert_eq!(joined.as_slice(), &[0, 1, 2, 3, 5, 4]);

        let c = Volume::<ObjectId>::new([1, 1, 5]);
        assert!(matches!(join_segmentations(&a, &c), Err(VolumeError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_label_union_splits_overlaps() {
        let canvas = Volume::from_vec([1, 1, 4], vec![1u16, 1, 1, 0]).unwrap();
        let image = Volume::from_vec([1, 1, 2], vec![2u16, 2]).unwrap();
        let result = ImageCombiner::LabelUnion.combine(canvas, &[image], &[[0, 0, 2]]).unwrap();
        assert_eq!(result.as_slice(), &[2, 2, 3, 1]);
    }

    #[test]
    fn test_stitch_negative_origin() {
        let primary = plane([2, 2], 1);
        let other = plane([2, 3], 2);
        let stitched = AlignedStitcher::new(primary, ImageCombiner::Overwrite)
            .stitch(&[other], &[[0, -1, 1]])
            .unwrap()
            .into_image();

        assert_eq!(stitched.shape(), [1, 3, 4]);
        assert_eq!(
            stitched.as_slice(),
            &[
                0, 2, 2, 2, //
                1, 2, 2, 2, //
                1, 1, 0, 0,
            ]
        );
    }

    #[test]
    fn test_stitch_requires_exactly_one_image() {
        let stitcher = AlignedStitcher::new(plane([2, 2], 1), ImageCombiner::Max);
        assert!(matches!(stitcher.stitch(&[], &[]), Err(VolumeError::NotImplemented(_))));
        let others = [plane([1, 1], 2), plane([1, 1], 3)];
        assert!(matches!(
            stitcher.stitch(&others, &[[0, 0, 0], [0, 1, 1]]),
            Err(VolumeError::NotImplemented(_))
        ));
        assert!(matches!(
            stitcher.stitch(&others[..1], &[[0, 0, 0], [0, 1, 1]]),
            Err(VolumeError::NotImplemented(_))
        ));
    }
}
