//! Upload drivers for batch and single-shot modes
//!
//! Batch mode dispatches pending slices across a bounded pool of tasks and
//! funnels results over a channel back to a single loop that owns the
//! progress tracker, so markers are never written concurrently. A marker is
//! created only after the sink write for that slice has returned success;
//! violating that order would permanently skip unwritten data on resume.

use crate::block::PixelBlock;
use crate::error::{Result, UploadError};
use crate::loader;
use crate::sink::VolumeSink;
use crate::tracker::ProgressTracker;
use crate::types::Provenance;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task;

/// Default number of upload workers
pub const DEFAULT_WORKERS: usize = 8;

/// Native (page, row, column) to target (X, Y, Z) axis order
const STACK_PERMUTATION: [usize; 3] = [2, 1, 0];

/// Native (row, column) to target (X, Y) axis order
const SLICE_PERMUTATION: [usize; 2] = [1, 0];

/// Configuration for a batch upload run
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory containing the per-slice TIFF files
    pub source_dir: PathBuf,

    /// File name prefix; slices follow `{prefix}_{z:06}.tif`
    pub file_prefix: String,

    /// Number of concurrent upload workers
    pub workers: usize,

    /// Directory holding completion markers
    pub progress_dir: PathBuf,
}

impl UploadConfig {
    pub fn new(source_dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            file_prefix: file_prefix.into(),
            workers: DEFAULT_WORKERS,
            progress_dir: PathBuf::from("progress"),
        }
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the progress marker directory
    pub fn with_progress_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.progress_dir = dir.into();
        self
    }

    /// Source file path for the slice at `z`
    pub fn slice_path(&self, z: i64) -> PathBuf {
        self.source_dir
            .join(format!("{}_{:06}.tif", self.file_prefix, z))
    }
}

/// Outcome of a batch upload run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Slices uploaded and marked done in this run
    pub uploaded: usize,

    /// Slices skipped because their markers already existed
    pub skipped: usize,

    /// Slices that failed; re-running the driver retries exactly these
    pub failed: usize,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Batch resumable upload driver
pub struct UploadDriver {
    config: UploadConfig,
    sink: Arc<dyn VolumeSink>,
    tracker: ProgressTracker,
    provenance: Provenance,
}

impl UploadDriver {
    /// Create a driver, opening the progress tracker from the config
    pub fn new(
        config: UploadConfig,
        sink: Arc<dyn VolumeSink>,
        provenance: Provenance,
    ) -> Result<Self> {
        sink.descriptor().validate_for_slices()?;
        let tracker = ProgressTracker::open(&config.progress_dir)?;
        Ok(Self {
            config,
            sink,
            tracker,
            provenance,
        })
    }

    /// Run the upload: enumerate, filter, dispatch, mark
    ///
    /// Per-slice failures are logged and counted, never aborting slices in
    /// flight. There is no retry; a failed slice stays unmarked and is
    /// picked up by the next run.
    pub async fn run(&self) -> Result<UploadReport> {
        let (z_min, z_max) = self.sink.z_bounds();
        let done = self.tracker.completed_set()?;
        let pending: Vec<i64> = (z_min..=z_max).filter(|z| !done.contains(z)).collect();

        let total = (z_max - z_min + 1) as usize;
        let skipped = total - pending.len();
        info!(
            "uploading {} of {} slices ({} already done) with {} workers",
            pending.len(),
            total,
            skipped,
            self.config.workers
        );

        self.sink.commit_provenance(&self.provenance).await?;

        if pending.is_empty() {
            return Ok(UploadReport {
                uploaded: 0,
                skipped,
                failed: 0,
            });
        }

        let workers = self.config.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel::<(i64, Result<()>)>(workers);

        for z in pending {
            let semaphore = Arc::clone(&semaphore);
            let sink = Arc::clone(&self.sink);
            let path = self.config.slice_path(z);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => upload_slice(&path, z, sink.as_ref()).await,
                    Err(_) => Err(UploadError::Configuration(
                        "worker pool shut down".to_string(),
                    )),
                };
                // Receiver dropping means the run was abandoned; nothing to do
                let _ = tx.send((z, outcome)).await;
            });
        }
        drop(tx);

        // Single-threaded tracker updates: only this loop touches markers
        let mut uploaded = 0;
        let mut failed = 0;
        while let Some((z, outcome)) = rx.recv().await {
            match outcome {
                Ok(()) => {
                    self.tracker.mark_done(z)?;
                    uploaded += 1;
                }
                Err(err) => {
                    error!("slice {} failed: {}", z, err);
                    failed += 1;
                }
            }
        }

        let report = UploadReport {
            uploaded,
            skipped,
            failed,
        };
        info!(
            "upload finished: {} uploaded, {} skipped, {} failed",
            report.uploaded, report.skipped, report.failed
        );
        Ok(report)
    }
}

/// Load, transform, and write one slice
async fn upload_slice(path: &Path, z: i64, sink: &dyn VolumeSink) -> Result<()> {
    let owned_path = path.to_path_buf();
    let block = task::spawn_blocking(move || -> Result<PixelBlock> {
        // Sources are single-channel (row, column); the sink expects a
        // trailing channel axis
        let block = loader::load_slice(&owned_path)?.to_target_axes(&SLICE_PERMUTATION)?;
        Ok(block.with_channel_axis())
    })
    .await
    .map_err(|e| UploadError::Configuration(format!("decode task failed: {}", e)))??;

    sink.write_slice(z, &block).await
}

/// Single-shot upload of an entire volume from one multi-page TIFF
///
/// Every failure is fatal; no partial write is assumed valid and nothing is
/// recorded in any progress tracker.
pub async fn upload_volume(
    img: &Path,
    sink: Arc<dyn VolumeSink>,
    provenance: &Provenance,
) -> Result<()> {
    loader::require_tiff_extension(img)?;

    let path = img.to_path_buf();
    let block = task::spawn_blocking(move || loader::load_stack(&path))
        .await
        .map_err(|e| UploadError::Configuration(format!("decode task failed: {}", e)))??;

    info!("loaded stack {} with native shape {:?}", img.display(), block.shape());

    let block = block.to_target_axes(&STACK_PERMUTATION)?;
    let block = if block.ndim() == 3 {
        block.with_channel_axis()
    } else {
        block
    };
    // Hard preconditions: checked before anything is written
    block.validate_against(sink.descriptor())?;

    sink.commit_provenance(provenance).await?;
    sink.write_volume(&block).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_path_zero_padding() {
        let config = UploadConfig::new("/data/images", "brain");
        assert_eq!(
            config.slice_path(5),
            PathBuf::from("/data/images/brain_000005.tif")
        );
        assert_eq!(
            config.slice_path(123456),
            PathBuf::from("/data/images/brain_123456.tif")
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = UploadConfig::new("/data", "img");
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.progress_dir, PathBuf::from("progress"));

        let config = config.with_workers(0);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_report_completeness() {
        let report = UploadReport {
            uploaded: 3,
            skipped: 7,
            failed: 0,
        };
        assert!(report.is_complete());

        let report = UploadReport {
            uploaded: 2,
            skipped: 0,
            failed: 1,
        };
        assert!(!report.is_complete());
    }
}
