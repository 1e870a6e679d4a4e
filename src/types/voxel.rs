//! Element types a volume can hold.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The semantic element type of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    U16,
    U32,
    U64,
    F32,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 | DataType::F32 => 4,
            DataType::U64 => 8,
        }
    }

    /// The Zarr v2 dtype string for this type (little-endian).
    pub fn zarr_dtype(&self) -> &'static str {
        match self {
            DataType::U8 => "|u1",
            DataType::U16 => "<u2",
            DataType::U32 => "<u4",
            DataType::U64 => "<u8",
            DataType::F32 => "<f4",
        }
    }

    /// Parse a Zarr v2 dtype string.
    pub fn from_zarr_dtype(s: &str) -> Option<Self> {
        match s {
            "|u1" | "<u1" => Some(DataType::U8),
            "<u2" => Some(DataType::U16),
            "<u4" => Some(DataType::U32),
            "<u8" => Some(DataType::U64),
            "<f4" => Some(DataType::F32),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U8 => "u8",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// A volume element.
///
/// Conversions to and from `f64` and labels saturate, so that combiners and
/// segmenters can work generically over every supported type.
pub trait Voxel:
    Copy + Default + PartialEq + PartialOrd + Send + Sync + fmt::Debug + 'static
{
    const DATA_TYPE: DataType;

    fn to_f64(self) -> f64;

    /// Convert from `f64`, truncating toward zero and saturating.
    fn from_f64(value: f64) -> Self;

    /// Interpret the value as an integer object label.
    fn to_label(self) -> u64;

    /// Store an integer label, saturating at the type's maximum.
    fn from_label(label: u64) -> Self;

    /// Append the little-endian encoding of the value.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode a value from the first `DATA_TYPE.size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Decode a 2D image into a row-major plane of grayscale values.
    fn plane_from_image(image: DynamicImage) -> Vec<Self>;
}

macro_rules! impl_unsigned_voxel {
    ($ty:ty, $data_type:expr, $size:expr, |$image:ident| $decode:expr) => {
        impl Voxel for $ty {
            const DATA_TYPE: DataType = $data_type;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn to_label(self) -> u64 {
                self as u64
            }

            fn from_label(label: u64) -> Self {
                label.min(<$ty>::MAX as u64) as $ty
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $size];
                raw.copy_from_slice(&bytes[..$size]);
                <$ty>::from_le_bytes(raw)
            }

            fn plane_from_image($image: DynamicImage) -> Vec<Self> {
                $decode
            }
        }
    };
}

impl_unsigned_voxel!(u8, DataType::U8, 1, |image| image.into_luma8().into_raw());
impl_unsigned_voxel!(u16, DataType::U16, 2, |image| image.into_luma16().into_raw());
impl_unsigned_voxel!(u32, DataType::U32, 4, |image| image
    .into_luma16()
    .into_raw()
    .into_iter()
    .map(u32::from)
    .collect());
impl_unsigned_voxel!(u64, DataType::U64, 8, |image| image
    .into_luma16()
    .into_raw()
    .into_iter()
    .map(u64::from)
    .collect());

impl Voxel for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_label(self) -> u64 {
        self as u64
    }

    fn from_label(label: u64) -> Self {
        label as f32
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(raw)
    }

    fn plane_from_image(image: DynamicImage) -> Vec<Self> {
        image.to_luma32f().into_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zarr_dtype_roundtrip() {
        for data_type in [
            DataType::U8,
            DataType::U16,
            DataType::U32,
            DataType::U64,
            DataType::F32,
        ] {
            assert_eq!(DataType::from_zarr_dtype(data_type.zarr_dtype()), Some(data_type));
        }
        assert_eq!(DataType::from_zarr_dtype(">i8"), None);
    }

    #[test]
    fn test_saturating_conversions() {
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-4.0), 0);
        assert_eq!(u8::from_f64(2.9), 2);
        assert_eq!(u16::from_label(70_000), u16::MAX);
        assert_eq!(f32::from_label(7), 7.0);
    }

    #[test]
    fn test_le_encoding() {
        let mut bytes = Vec::new();
        0x0102_0304u32.write_le(&mut bytes);
        assert_eq!(bytes, vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!(u32::read_le(&bytes), 0x0102_0304);
    }

    #[test]
    fn test_float_plane_from_image() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::from_raw(2, 1, vec![0, 255]).unwrap());
        assert_eq!(f32::plane_from_image(image.clone()), vec![0.0, 1.0]);
        assert_eq!(u8::plane_from_image(image), vec![0, 255]);
    }
}
