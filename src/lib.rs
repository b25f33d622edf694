//! ngstack - TIFF stack uploads into Neuroglancer precomputed volumes
//!
//! Reads multi-dimensional TIFF image stacks and uploads them, re-chunked
//! and re-ordered, into an object-storage-backed volumetric format suitable
//! for a web-based volume viewer.
//!
//! # Features
//!
//! - Batch resumable uploads: one TIFF file per z slice, a bounded worker
//!   pool, and filesystem completion markers so interrupted runs pick up
//!   where they left off
//! - Single-shot uploads: one multi-page TIFF validated against a declared
//!   volume descriptor and written in a single sink call
//! - Local filesystem sink (implement the `VolumeSink` trait for cloud
//!   storage)
//!
//! # Example
//!
//! ```rust,ignore
//! use ngstack::{create_sink, Provenance, UploadConfig, UploadDriver};
//!
//! # async fn example(descriptor: ngstack::VolumeDescriptor) -> ngstack::Result<()> {
//! let sink = create_sink("file:///data/dataset/layer", descriptor).await?;
//! let config = UploadConfig::new("/data/images", "brain").with_workers(8);
//! let provenance = Provenance::new("serial section EM", vec![]);
//! let report = UploadDriver::new(config, sink, provenance)?.run().await?;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod driver;
pub mod error;
pub mod loader;
pub mod sink;
pub mod tracker;
pub mod types;

// Re-exports
pub use block::{PixelBlock, PixelData};
pub use driver::{upload_volume, UploadConfig, UploadDriver, UploadReport, DEFAULT_WORKERS};
pub use error::{Result, UploadError};
pub use sink::{create_sink, FilesystemSink, StorageBackend, VolumeSink};
pub use tracker::ProgressTracker;
pub use types::{DataType, Encoding, LayerKind, Provenance, VolumeDescriptor};

/// Version of this crate
pub const NGSTACK_VERSION: &str = env!("CARGO_PKG_VERSION");
