//! Volume sinks - destinations for axis-ordered pixel data
//!
//! The sink owns chunking and persistence. Only a local filesystem sink is
//! provided; for cloud storage (S3, GCS, Azure), implement the
//! [`VolumeSink`] trait in your application using your preferred cloud SDK.

use crate::block::PixelBlock;
use crate::error::{Result, UploadError};
use crate::types::{DataType, Encoding, LayerKind, Provenance, VolumeDescriptor};
use async_trait::async_trait;
use futures::future::try_join_all;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local file system
    FileSystem,
    /// AWS S3
    S3,
    /// Google Cloud Storage
    GCS,
    /// Azure Blob Storage
    Azure,
}

impl StorageBackend {
    /// Parse storage backend from URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end];
            match scheme {
                "file" => Ok(StorageBackend::FileSystem),
                "s3" => Ok(StorageBackend::S3),
                "gs" => Ok(StorageBackend::GCS),
                "azure" => Ok(StorageBackend::Azure),
                _ => Err(UploadError::InvalidUrl(format!(
                    "Unknown scheme: {}",
                    scheme
                ))),
            }
        } else {
            // Assume file system if no scheme
            Ok(StorageBackend::FileSystem)
        }
    }
}

/// Destination for axis-ordered pixel data
///
/// Implementations must tolerate concurrent `write_slice` calls for
/// disjoint z indices; the driver performs no locking of its own.
#[async_trait]
pub trait VolumeSink: Send + Sync {
    /// The volume this sink persists
    fn descriptor(&self) -> &VolumeDescriptor;

    /// Inclusive z bounds of the volume
    fn z_bounds(&self) -> (i64, i64) {
        self.descriptor().z_bounds()
    }

    /// Commit provenance metadata; called once per run before data upload
    async fn commit_provenance(&self, provenance: &Provenance) -> Result<()>;

    /// Persist one (X, Y, channel) slice at the given z coordinate
    async fn write_slice(&self, z: i64, block: &PixelBlock) -> Result<()>;

    /// Persist an entire (X, Y, Z, channel) volume
    async fn write_volume(&self, block: &PixelBlock) -> Result<()>;
}

/// Viewer metadata document describing the volume, written at layer root
#[derive(Debug, Serialize, Deserialize)]
struct InfoDocument {
    #[serde(rename = "type")]
    layer_kind: LayerKind,
    data_type: DataType,
    num_channels: u32,
    scales: Vec<ScaleEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScaleEntry {
    key: String,
    encoding: Encoding,
    resolution: [u32; 3],
    size: [u64; 3],
    voxel_offset: [i64; 3],
    chunk_sizes: Vec<[u64; 3]>,
}

impl InfoDocument {
    fn from_descriptor(descriptor: &VolumeDescriptor) -> Self {
        Self {
            layer_kind: descriptor.layer_kind,
            data_type: descriptor.data_type,
            num_channels: descriptor.num_channels,
            scales: vec![ScaleEntry {
                key: descriptor.scale_key(),
                encoding: descriptor.encoding,
                resolution: descriptor.resolution,
                size: descriptor.volume_shape,
                voxel_offset: descriptor.voxel_offset,
                chunk_sizes: vec![descriptor.chunk_shape],
            }],
        }
    }
}

/// Half-open chunk ranges tiling `extent`, clamping the last chunk
fn chunk_ranges(extent: u64, chunk: u64) -> Vec<(usize, usize)> {
    (0..extent)
        .step_by(chunk as usize)
        .map(|start| (start as usize, (start + chunk).min(extent) as usize))
        .collect()
}

/// Local filesystem sink writing raw little-endian chunk files
///
/// Layout under the layer root: an `info` document, a `provenance`
/// document, and one file per chunk named
/// `x0-x1_y0-y1_z0-z1` (global voxel coordinates) under the scale key
/// directory.
pub struct FilesystemSink {
    root: PathBuf,
    descriptor: VolumeDescriptor,
}

impl FilesystemSink {
    /// Create a sink at `root`, validating the descriptor and committing
    /// the `info` document
    pub async fn create(root: impl AsRef<Path>, descriptor: VolumeDescriptor) -> Result<Self> {
        descriptor.validate()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(descriptor.scale_key())).await?;

        let info = InfoDocument::from_descriptor(&descriptor);
        fs::write(root.join("info"), serde_json::to_vec_pretty(&info)?).await?;

        info!("created volume at {}: {:?}", root.display(), descriptor.volume_shape);
        Ok(Self { root, descriptor })
    }

    fn chunk_path(&self, x: (i64, i64), y: (i64, i64), z: (i64, i64)) -> PathBuf {
        self.root.join(self.descriptor.scale_key()).join(format!(
            "{}-{}_{}-{}_{}-{}",
            x.0, x.1, y.0, y.1, z.0, z.1
        ))
    }

    fn check_slice_geometry(&self, z: i64, block: &PixelBlock) -> Result<()> {
        let desc = &self.descriptor;
        if desc.chunk_shape[2] != 1 {
            return Err(UploadError::Configuration(format!(
                "slice writes require chunk z-extent 1, got {}",
                desc.chunk_shape[2]
            )));
        }
        let (z_min, z_max) = desc.z_bounds();
        if z < z_min || z > z_max {
            return Err(UploadError::SinkWrite(format!(
                "z {} outside volume bounds [{}, {}]",
                z, z_min, z_max
            )));
        }
        if block.dtype() != desc.data_type {
            return Err(UploadError::DtypeMismatch {
                expected: desc.data_type,
                actual: block.dtype(),
            });
        }
        let expected = vec![
            desc.volume_shape[0] as usize,
            desc.volume_shape[1] as usize,
            desc.num_channels as usize,
        ];
        if block.shape() != expected.as_slice() {
            return Err(UploadError::ShapeMismatch {
                expected,
                actual: block.shape().to_vec(),
            });
        }
        Ok(())
    }

    async fn write_chunk(&self, path: PathBuf, data: bytes::Bytes) -> Result<()> {
        fs::write(&path, &data)
            .await
            .map_err(|e| UploadError::SinkWrite(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl VolumeSink for FilesystemSink {
    fn descriptor(&self) -> &VolumeDescriptor {
        &self.descriptor
    }

    async fn commit_provenance(&self, provenance: &Provenance) -> Result<()> {
        let json = serde_json::to_vec_pretty(provenance)?;
        fs::write(self.root.join("provenance"), json)
            .await
            .map_err(|e| UploadError::SinkWrite(format!("provenance: {}", e)))
    }

    async fn write_slice(&self, z: i64, block: &PixelBlock) -> Result<()> {
        self.check_slice_geometry(z, block)?;
        let desc = &self.descriptor;
        let [off_x, off_y, _] = desc.voxel_offset;

        let mut writes = Vec::new();
        for (x0, x1) in chunk_ranges(desc.volume_shape[0], desc.chunk_shape[0]) {
            for (y0, y1) in chunk_ranges(desc.volume_shape[1], desc.chunk_shape[1]) {
                let region = block.region(&[x0, y0], &[x1, y1])?;
                let path = self.chunk_path(
                    (off_x + x0 as i64, off_x + x1 as i64),
                    (off_y + y0 as i64, off_y + y1 as i64),
                    (z, z + 1),
                );
                writes.push(self.write_chunk(path, region.to_le_bytes()));
            }
        }
        try_join_all(writes).await?;
        Ok(())
    }

    async fn write_volume(&self, block: &PixelBlock) -> Result<()> {
        block.validate_against(&self.descriptor)?;
        let desc = &self.descriptor;
        let [off_x, off_y, off_z] = desc.voxel_offset;

        let mut writes = Vec::new();
        for (x0, x1) in chunk_ranges(desc.volume_shape[0], desc.chunk_shape[0]) {
            for (y0, y1) in chunk_ranges(desc.volume_shape[1], desc.chunk_shape[1]) {
                for (z0, z1) in chunk_ranges(desc.volume_shape[2], desc.chunk_shape[2]) {
                    let region = block.region(&[x0, y0, z0], &[x1, y1, z1])?;
                    let path = self.chunk_path(
                        (off_x + x0 as i64, off_x + x1 as i64),
                        (off_y + y0 as i64, off_y + y1 as i64),
                        (off_z + z0 as i64, off_z + z1 as i64),
                    );
                    writes.push(self.write_chunk(path, region.to_le_bytes()));
                }
            }
        }
        try_join_all(writes).await?;
        Ok(())
    }
}

/// Parse a bucket URI and create the appropriate sink
///
/// Only filesystem URIs are supported here; cloud backends require an
/// application-provided [`VolumeSink`] implementation.
pub async fn create_sink(
    url: &str,
    descriptor: VolumeDescriptor,
) -> Result<Arc<dyn VolumeSink>> {
    let backend = StorageBackend::from_url(url)?;

    match backend {
        StorageBackend::FileSystem => {
            let path = url.strip_prefix("file://").unwrap_or(url);
            Ok(Arc::new(FilesystemSink::create(path, descriptor).await?))
        }
        StorageBackend::S3 | StorageBackend::GCS | StorageBackend::Azure => {
            Err(UploadError::Configuration(format!(
                "Cloud backend {:?} is not built in. Implement the VolumeSink \
                 trait for your cloud storage and pass it to the driver directly.",
                backend
            )))
        }
    }
}
