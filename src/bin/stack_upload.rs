//! Batch resumable upload of per-slice TIFF files into a volume sink
//!
//! Slice files are expected to follow `{prefix}_{z:06}.tif` under the
//! source directory. Completed slices are recorded as markers in the
//! progress directory; re-running retries only what is missing.

use anyhow::Result;
use clap::Parser;
use log::info;
use ngstack::{create_sink, Provenance, UploadConfig, UploadDriver, VolumeDescriptor};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stack_upload")]
#[command(about = "Resumable parallel upload of a TIFF slice directory")]
struct Args {
    /// Directory containing the per-slice TIFF files
    #[arg(long)]
    source_dir: PathBuf,

    /// Destination volume location, e.g. file:///data/dataset/layer
    #[arg(long)]
    bucket: String,

    /// Path to a JSON volume descriptor file
    #[arg(long)]
    descriptor: PathBuf,

    /// Slice file name prefix
    #[arg(long, default_value = "brain")]
    prefix: String,

    /// Number of upload workers
    #[arg(long, default_value_t = ngstack::DEFAULT_WORKERS)]
    workers: usize,

    /// Directory holding completion markers
    #[arg(long, default_value = "progress")]
    progress_dir: PathBuf,

    /// Free-text description of the dataset
    #[arg(long, default_value = "")]
    description: String,

    /// Contact identifier for the uploader/imager (repeatable)
    #[arg(long = "owner")]
    owners: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let descriptor: VolumeDescriptor = serde_json::from_str(&fs::read_to_string(&args.descriptor)?)?;
    let sink = create_sink(&args.bucket, descriptor).await?;

    let config = UploadConfig::new(&args.source_dir, &args.prefix)
        .with_workers(args.workers)
        .with_progress_dir(&args.progress_dir);
    let provenance = Provenance::new(args.description, args.owners);

    let driver = UploadDriver::new(config, sink, provenance)?;
    let report = driver.run().await?;

    if !report.is_complete() {
        anyhow::bail!(
            "{} slices failed to upload; re-run to retry them",
            report.failed
        );
    }
    info!("all {} pending slices uploaded", report.uploaded);
    Ok(())
}
