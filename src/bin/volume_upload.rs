//! Single-shot upload of one multi-page TIFF into a volume sink
//!
//! The decoded stack must match the declared descriptor's shape and data
//! type exactly; any mismatch aborts before anything is written.

use anyhow::Result;
use clap::Parser;
use log::info;
use ngstack::{create_sink, upload_volume, Provenance, VolumeDescriptor};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "volume_upload")]
#[command(about = "Upload one multi-page TIFF as an entire volume")]
struct Args {
    /// Source TIFF file
    #[arg(long)]
    img: PathBuf,

    /// Destination volume location, e.g. file:///data/dataset/layer
    #[arg(long)]
    bucket: String,

    /// Path to a JSON volume descriptor file
    #[arg(long)]
    descriptor: PathBuf,

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
    let provenance = Provenance::new(args.description, args.owners);

    upload_volume(&args.img, sink, &provenance).await?;
    info!("volume {} uploaded", args.img.display());
    Ok(())
}
