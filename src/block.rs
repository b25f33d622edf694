//! Decoded pixel blocks and axis reordering

use crate::error::{Result, UploadError};
use crate::types::{DataType, VolumeDescriptor};
use bytes::Bytes;
use ndarray::{ArrayD, Axis, Slice};

/// Dtype-tagged sample data
#[derive(Debug, Clone)]
pub enum PixelData {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
}

/// Decoded sample data for one slice or a whole volume
///
/// A block carries its axis order implicitly in its shape: freshly decoded
/// data is in native order (row, column) or (page, row, column), and
/// [`PixelBlock::to_target_axes`] reorders it into the sink's X/Y/Z
/// convention. The block is exclusively owned by the worker processing it
/// until handed to the sink.
#[derive(Debug, Clone)]
pub struct PixelBlock {
    data: PixelData,
}

impl PixelBlock {
    pub fn new(data: PixelData) -> Self {
        Self { data }
    }

    /// Sample data type of this block
    pub fn dtype(&self) -> DataType {
        match &self.data {
            PixelData::U8(_) => DataType::U8,
            PixelData::U16(_) => DataType::U16,
            PixelData::U32(_) => DataType::U32,
            PixelData::U64(_) => DataType::U64,
        }
    }

    /// Shape of this block in its current axis order
    pub fn shape(&self) -> &[usize] {
        match &self.data {
            PixelData::U8(a) => a.shape(),
            PixelData::U16(a) => a.shape(),
            PixelData::U32(a) => a.shape(),
            PixelData::U64(a) => a.shape(),
        }
    }

    /// Number of axes
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of samples
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reorder axes into the sink's target order
    ///
    /// `permutation[i]` names the native axis that becomes axis `i`. A
    /// native (Z, Y, X) block with permutation `[2, 1, 0]` becomes
    /// (X, Y, Z); a native (Y, X) slice with `[1, 0]` becomes (X, Y).
    pub fn to_target_axes(self, permutation: &[usize]) -> Result<Self> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        for &axis in permutation {
            if axis >= ndim || seen[axis] {
                return Err(UploadError::Configuration(format!(
                    "invalid axis permutation {:?} for {}-axis block",
                    permutation, ndim
                )));
            }
            seen[axis] = true;
        }
        if permutation.len() != ndim {
            return Err(UploadError::Configuration(format!(
                "axis permutation {:?} does not match {}-axis block",
                permutation, ndim
            )));
        }

        let data = match self.data {
            PixelData::U8(a) => PixelData::U8(a.permuted_axes(permutation)),
            PixelData::U16(a) => PixelData::U16(a.permuted_axes(permutation)),
            PixelData::U32(a) => PixelData::U32(a.permuted_axes(permutation)),
            PixelData::U64(a) => PixelData::U64(a.permuted_axes(permutation)),
        };
        Ok(Self { data })
    }

    /// Append a trailing singleton channel axis
    ///
    /// Used when the sink expects a channel axis and the source lacks one.
    pub fn with_channel_axis(self) -> Self {
        let last = Axis(self.ndim());
        let data = match self.data {
            PixelData::U8(a) => PixelData::U8(a.insert_axis(last)),
            PixelData::U16(a) => PixelData::U16(a.insert_axis(last)),
            PixelData::U32(a) => PixelData::U32(a.insert_axis(last)),
            PixelData::U64(a) => PixelData::U64(a.insert_axis(last)),
        };
        Self { data }
    }

    /// Validate this block against a declared volume descriptor
    ///
    /// The block must already be in (X, Y, Z, channel) order. Shape and
    /// dtype are hard preconditions and are never coerced.
    pub fn validate_against(&self, descriptor: &VolumeDescriptor) -> Result<()> {
        if self.dtype() != descriptor.data_type {
            return Err(UploadError::DtypeMismatch {
                expected: descriptor.data_type,
                actual: self.dtype(),
            });
        }

        let mut expected: Vec<usize> = descriptor
            .volume_shape
            .iter()
            .map(|&d| d as usize)
            .collect();
        expected.push(descriptor.num_channels as usize);
        if self.shape() != expected.as_slice() {
            return Err(UploadError::ShapeMismatch {
                expected,
                actual: self.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Extract an owned sub-block
    ///
    /// `start`/`end` give half-open ranges along the leading axes; trailing
    /// axes (the channel axis) are taken whole.
    pub fn region(&self, start: &[usize], end: &[usize]) -> Result<Self> {
        let shape = self.shape();
        if start.len() != end.len() || start.len() > shape.len() {
            return Err(UploadError::Configuration(format!(
                "region rank {}..{} does not fit {}-axis block",
                start.len(),
                end.len(),
                shape.len()
            )));
        }
        for i in 0..start.len() {
            if start[i] >= end[i] || end[i] > shape[i] {
                return Err(UploadError::Configuration(format!(
                    "region {:?}..{:?} out of bounds for shape {:?}",
                    start, end, shape
                )));
            }
        }

        fn slice_region<T: Clone>(a: &ArrayD<T>, start: &[usize], end: &[usize]) -> ArrayD<T> {
            a.slice_each_axis(|ax| {
                let i = ax.axis.index();
                if i < start.len() {
                    Slice::from(start[i]..end[i])
                } else {
                    Slice::from(..)
                }
            })
            .to_owned()
        }

        let data = match &self.data {
            PixelData::U8(a) => PixelData::U8(slice_region(a, start, end)),
            PixelData::U16(a) => PixelData::U16(slice_region(a, start, end)),
            PixelData::U32(a) => PixelData::U32(slice_region(a, start, end)),
            PixelData::U64(a) => PixelData::U64(slice_region(a, start, end)),
        };
        Ok(Self { data })
    }

    /// Serialize samples to little-endian bytes in logical (row-major) order
    pub fn to_le_bytes(&self) -> Bytes {
        match &self.data {
            PixelData::U8(a) => {
                if let Some(slice) = a.as_slice() {
                    Bytes::copy_from_slice(slice)
                } else {
                    a.iter().copied().collect::<Vec<u8>>().into()
                }
            }
            PixelData::U16(a) => {
                let mut buf = Vec::with_capacity(a.len() * 2);
                for v in a.iter() {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
                buf.into()
            }
            PixelData::U32(a) => {
                let mut buf = Vec::with_capacity(a.len() * 4);
                for v in a.iter() {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
                buf.into()
            }
            PixelData::U64(a) => {
                let mut buf = Vec::with_capacity(a.len() * 8);
                for v in a.iter() {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
                buf.into()
            }
        }
    }
}
