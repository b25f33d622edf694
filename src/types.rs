//! Core data types: volume descriptor and provenance

use crate::error::{Result, UploadError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample data types supported for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Unsigned 8-bit integer
    #[serde(rename = "uint8")]
    U8,
    /// Unsigned 16-bit integer
    #[serde(rename = "uint16")]
    U16,
    /// Unsigned 32-bit integer
    #[serde(rename = "uint32")]
    U32,
    /// Unsigned 64-bit integer
    #[serde(rename = "uint64")]
    U64,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 => 4,
            DataType::U64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
        };
        write!(f, "{}", name)
    }
}

/// Kind of layer the volume represents in the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Image,
    Segmentation,
}

/// Voxel encoding used by the sink
///
/// Only raw (uncompressed) encoding is supported; compressed encodings are
/// the sink's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Raw,
}

/// Immutable description of the target volume
///
/// All coordinates are in X, Y, Z order. Resolution is in physical units
/// (nanometers) per voxel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Number of channels per voxel
    pub num_channels: u32,

    /// Layer kind (image or segmentation)
    pub layer_kind: LayerKind,

    /// Sample data type
    pub data_type: DataType,

    /// Voxel encoding
    pub encoding: Encoding,

    /// Physical size of one voxel in nanometers, X/Y/Z
    pub resolution: [u32; 3],

    /// Origin of the volume in voxel coordinates, X/Y/Z
    pub voxel_offset: [i64; 3],

    /// Chunk shape in voxels, X/Y/Z
    pub chunk_shape: [u64; 3],

    /// Total volume shape in voxels, X/Y/Z
    pub volume_shape: [u64; 3],
}

impl VolumeDescriptor {
    /// Validate the descriptor geometry
    ///
    /// Chunks must evenly tile the volume along Z; along X and Y partial
    /// edge chunks are allowed.
    pub fn validate(&self) -> Result<()> {
        if self.num_channels == 0 {
            return Err(UploadError::InvalidDescriptor(
                "num_channels must be at least 1".to_string(),
            ));
        }
        if self.volume_shape.iter().any(|&d| d == 0) {
            return Err(UploadError::InvalidDescriptor(format!(
                "volume shape must be nonzero in every axis, got {:?}",
                self.volume_shape
            )));
        }
        if self.chunk_shape.iter().any(|&d| d == 0) {
            return Err(UploadError::InvalidDescriptor(format!(
                "chunk shape must be nonzero in every axis, got {:?}",
                self.chunk_shape
            )));
        }
        if self.volume_shape[2] % self.chunk_shape[2] != 0 {
            return Err(UploadError::InvalidDescriptor(format!(
                "chunk z-extent {} does not evenly tile volume z-extent {}",
                self.chunk_shape[2], self.volume_shape[2]
            )));
        }
        Ok(())
    }

    /// Validate the descriptor for per-slice batch uploads
    ///
    /// Per-slice writes cover exactly one z plane, so the chunk z-extent
    /// must be 1. Thicker chunks would require aggregating slices before
    /// writing, which this crate does not do.
    pub fn validate_for_slices(&self) -> Result<()> {
        self.validate()?;
        if self.chunk_shape[2] != 1 {
            return Err(UploadError::InvalidDescriptor(format!(
                "per-slice upload requires chunk z-extent 1, got {}",
                self.chunk_shape[2]
            )));
        }
        Ok(())
    }

    /// Inclusive z bounds of the volume in voxel coordinates
    pub fn z_bounds(&self) -> (i64, i64) {
        let min = self.voxel_offset[2];
        (min, min + self.volume_shape[2] as i64 - 1)
    }

    /// Scale key used by the sink to name this resolution level
    pub fn scale_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.resolution[0], self.resolution[1], self.resolution[2]
        )
    }
}

/// Provenance metadata committed to the sink once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Free-text description of the dataset
    pub description: String,

    /// Contact identifiers for the uploader/imager
    pub owners: Vec<String>,

    /// When this provenance record was created
    pub created_at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(description: impl Into<String>, owners: Vec<String>) -> Self {
        Self {
            description: description.into(),
            owners,
            created_at: Utc::now(),
        }
    }
}
