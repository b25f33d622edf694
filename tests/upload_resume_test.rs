//! Integration tests for the resumable batch driver and single-shot upload
//!
//! The batch tests drive a mock sink so the write/mark ordering and resume
//! behavior can be observed directly; the end-to-end tests use the real
//! filesystem sink.

use async_trait::async_trait;
use ngstack::{
    create_sink, upload_volume, DataType, Encoding, LayerKind, PixelBlock, ProgressTracker,
    Provenance, Result, UploadConfig, UploadDriver, UploadError, VolumeDescriptor, VolumeSink,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

const WIDTH: u32 = 6;
const HEIGHT: u32 = 4;
const DEPTH: u64 = 10;

fn batch_descriptor() -> VolumeDescriptor {
    VolumeDescriptor {
        num_channels: 1,
        layer_kind: LayerKind::Image,
        data_type: DataType::U8,
        encoding: Encoding::Raw,
        resolution: [8, 8, 8],
        voxel_offset: [0, 0, 0],
        chunk_shape: [3, 2, 1],
        volume_shape: [WIDTH as u64, HEIGHT as u64, DEPTH],
    }
}

fn write_gray8(path: &Path, width: u32, height: u32, pages: &[Vec<u8>]) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    for page in pages {
        encoder
            .write_image::<colortype::Gray8>(width, height, page)
            .unwrap();
    }
}

/// Writes one slice fixture per z index, filled with the index value
fn write_slice_fixtures(dir: &Path, prefix: &str, indices: impl IntoIterator<Item = i64>) {
    for z in indices {
        let page = vec![z as u8; (WIDTH * HEIGHT) as usize];
        write_gray8(
            &dir.join(format!("{}_{:06}.tif", prefix, z)),
            WIDTH,
            HEIGHT,
            &[page],
        );
    }
}

/// Sink that records which z indices were written, optionally failing some
struct MockSink {
    descriptor: VolumeDescriptor,
    writes: Mutex<Vec<i64>>,
    provenance_commits: Mutex<usize>,
    fail_on: Option<i64>,
}

impl MockSink {
    fn new(fail_on: Option<i64>) -> Self {
        Self {
            descriptor: batch_descriptor(),
            writes: Mutex::new(Vec::new()),
            provenance_commits: Mutex::new(0),
            fail_on,
        }
    }

    fn written(&self) -> Vec<i64> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl VolumeSink for MockSink {
    fn descriptor(&self) -> &VolumeDescriptor {
        &self.descriptor
    }

    async fn commit_provenance(&self, _provenance: &Provenance) -> Result<()> {
        *self.provenance_commits.lock() += 1;
        Ok(())
    }

    async fn write_slice(&self, z: i64, block: &PixelBlock) -> Result<()> {
        assert_eq!(block.shape(), &[WIDTH as usize, HEIGHT as usize, 1]);
        if self.fail_on == Some(z) {
            return Err(UploadError::SinkWrite(format!("injected failure at z {}", z)));
        }
        self.writes.lock().push(z);
        Ok(())
    }

    async fn write_volume(&self, _block: &PixelBlock) -> Result<()> {
        unimplemented!("batch tests never write whole volumes")
    }
}

fn driver_for(
    source: &TempDir,
    progress: &Path,
    sink: Arc<MockSink>,
    workers: usize,
) -> UploadDriver {
    let config = UploadConfig::new(source.path(), "brain")
        .with_workers(workers)
        .with_progress_dir(progress);
    let provenance = Provenance::new("integration test", vec!["tester@example.org".to_string()]);
    UploadDriver::new(config, sink, provenance).unwrap()
}

#[tokio::test]
async fn resumes_exactly_the_pending_slices() {
    let source = TempDir::new().unwrap();
    let progress = source.path().join("progress");
    write_slice_fixtures(source.path(), "brain", 0..DEPTH as i64);

    // Pre-mark z 2, 5, 7 as done
    let tracker = ProgressTracker::open(&progress).unwrap();
    for z in [2, 5, 7] {
        tracker.mark_done(z).unwrap();
    }

    let sink = Arc::new(MockSink::new(None));
    let report = driver_for(&source, &progress, Arc::clone(&sink), 4)
        .run()
        .await
        .unwrap();

    assert_eq!(report.uploaded, 7);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.failed, 0);

    // Exactly the pending indices, each written once
    let mut written = sink.written();
    written.sort_unstable();
    assert_eq!(written, vec![0, 1, 3, 4, 6, 8, 9]);

    // All indices are now marked done
    let done = tracker.completed_set().unwrap();
    assert_eq!(done, (0..DEPTH as i64).collect::<HashSet<i64>>());

    assert_eq!(*sink.provenance_commits.lock(), 1);
}

#[tokio::test]
async fn failed_slice_is_never_marked_done() {
    let source = TempDir::new().unwrap();
    let progress = source.path().join("progress");
    write_slice_fixtures(source.path(), "brain", 0..DEPTH as i64);

    let sink = Arc::new(MockSink::new(Some(6)));
    let report = driver_for(&source, &progress, Arc::clone(&sink), 8)
        .run()
        .await
        .unwrap();

    assert_eq!(report.uploaded, 9);
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());

    // Write-before-mark: the failed index must be absent from the markers
    let tracker = ProgressTracker::open(&progress).unwrap();
    let done = tracker.completed_set().unwrap();
    assert!(!done.contains(&6));
    assert_eq!(done.len(), 9);

    // A second run retries exactly the failed index
    let retry_sink = Arc::new(MockSink::new(None));
    let report = driver_for(&source, &progress, Arc::clone(&retry_sink), 8)
        .run()
        .await
        .unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 9);
    assert_eq!(retry_sink.written(), vec![6]);
}

#[tokio::test]
async fn missing_source_file_does_not_abort_siblings() {
    let source = TempDir::new().unwrap();
    let progress = source.path().join("progress");
    // No fixture for z=4
    write_slice_fixtures(source.path(), "brain", (0..DEPTH as i64).filter(|&z| z != 4));

    let sink = Arc::new(MockSink::new(None));
    let report = driver_for(&source, &progress, Arc::clone(&sink), 4)
        .run()
        .await
        .unwrap();

    assert_eq!(report.uploaded, 9);
    assert_eq!(report.failed, 1);

    let done = ProgressTracker::open(&progress)
        .unwrap()
        .completed_set()
        .unwrap();
    assert!(!done.contains(&4));
}

#[tokio::test]
async fn empty_pending_set_uploads_nothing() {
    let source = TempDir::new().unwrap();
    let progress = source.path().join("progress");

    let tracker = ProgressTracker::open(&progress).unwrap();
    for z in 0..DEPTH as i64 {
        tracker.mark_done(z).unwrap();
    }

    let sink = Arc::new(MockSink::new(None));
    let report = driver_for(&source, &progress, Arc::clone(&sink), 4)
        .run()
        .await
        .unwrap();

    assert_eq!(report.uploaded, 0);
    assert_eq!(report.skipped, DEPTH as usize);
    assert!(sink.written().is_empty());
}

#[tokio::test]
async fn thick_chunks_are_rejected_for_batch_mode() {
    let source = TempDir::new().unwrap();
    let mut descriptor = batch_descriptor();
    descriptor.chunk_shape = [3, 2, 5];

    let layer = TempDir::new().unwrap();
    let url = format!("file://{}", layer.path().display());
    let sink = create_sink(&url, descriptor).await.unwrap();

    let config =
        UploadConfig::new(source.path(), "brain").with_progress_dir(source.path().join("progress"));
    let err = UploadDriver::new(config, sink, Provenance::new("", vec![]))
        .err()
        .expect("thick z chunks must be rejected");
    assert!(matches!(err, UploadError::InvalidDescriptor(_)));
}

#[tokio::test]
async fn batch_upload_end_to_end_writes_chunk_files() {
    let source = TempDir::new().unwrap();
    let progress = source.path().join("progress");
    write_slice_fixtures(source.path(), "brain", 0..DEPTH as i64);

    let layer = TempDir::new().unwrap();
    let url = format!("file://{}", layer.path().display());
    let sink = create_sink(&url, batch_descriptor()).await.unwrap();

    let config = UploadConfig::new(source.path(), "brain")
        .with_workers(4)
        .with_progress_dir(&progress);
    let report = UploadDriver::new(config, sink, Provenance::new("e2e", vec![]))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(report.is_complete());

    // 6x4 slices with 3x2 chunks: 2x2 files per slice, filled with z
    let scale = layer.path().join("8_8_8");
    let chunk = std::fs::read(scale.join("0-3_0-2_7-8")).unwrap();
    assert_eq!(chunk, vec![7u8; 6]);
    assert_eq!(
        std::fs::read_dir(&scale).unwrap().count(),
        4 * DEPTH as usize
    );
    assert!(layer.path().join("info").is_file());
    assert!(layer.path().join("provenance").is_file());
}

#[tokio::test]
async fn single_shot_upload_end_to_end() {
    let source = TempDir::new().unwrap();
    let img = source.path().join("stack.tif");
    // 3 pages of 5x4 (width x height), native (Z, Y, X) = (3, 4, 5)
    let pages: Vec<Vec<u8>> = (0..3u8).map(|z| vec![z; 20]).collect();
    write_gray8(&img, 5, 4, &pages);

    let descriptor = VolumeDescriptor {
        num_channels: 1,
        layer_kind: LayerKind::Image,
        data_type: DataType::U8,
        encoding: Encoding::Raw,
        resolution: [8, 8, 8],
        voxel_offset: [0, 0, 0],
        chunk_shape: [5, 4, 1],
        volume_shape: [5, 4, 3],
    };

    let layer = TempDir::new().unwrap();
    let url = format!("file://{}", layer.path().display());
    let sink = create_sink(&url, descriptor).await.unwrap();

    upload_volume(&img, sink, &Provenance::new("single shot", vec![]))
        .await
        .unwrap();

    let scale = layer.path().join("8_8_8");
    assert_eq!(std::fs::read_dir(&scale).unwrap().count(), 3);
    // Each unit-z chunk holds one transposed page
    assert_eq!(std::fs::read(scale.join("0-5_0-4_2-3")).unwrap(), vec![2u8; 20]);
    assert!(layer.path().join("provenance").is_file());
}

#[tokio::test]
async fn single_shot_shape_mismatch_is_fatal_before_write() {
    let source = TempDir::new().unwrap();
    let img = source.path().join("stack.tif");
    let pages: Vec<Vec<u8>> = (0..3u8).map(|z| vec![z; 20]).collect();
    write_gray8(&img, 5, 4, &pages);

    // Declared shape does not match the decoded stack
    let descriptor = VolumeDescriptor {
        num_channels: 1,
        layer_kind: LayerKind::Image,
        data_type: DataType::U8,
        encoding: Encoding::Raw,
        resolution: [8, 8, 8],
        voxel_offset: [0, 0, 0],
        chunk_shape: [4, 5, 1],
        volume_shape: [4, 5, 3],
    };

    let layer = TempDir::new().unwrap();
    let url = format!("file://{}", layer.path().display());
    let sink = create_sink(&url, descriptor).await.unwrap();

    let err = upload_volume(&img, sink, &Provenance::new("", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::ShapeMismatch { .. }));

    // Nothing was written: no provenance, no chunks
    assert!(!layer.path().join("provenance").exists());
    assert_eq!(
        std::fs::read_dir(layer.path().join("8_8_8")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn single_shot_rejects_non_tiff_extension() {
    let source = TempDir::new().unwrap();
    let img = source.path().join("stack.png");
    File::create(&img).unwrap();

    let layer = TempDir::new().unwrap();
    let url = format!("file://{}", layer.path().display());
    let sink = create_sink(&url, batch_descriptor()).await.unwrap();

    let err = upload_volume(&img, sink, &Provenance::new("", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidExtension(_)));
}
