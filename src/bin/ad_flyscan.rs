//! Fly scan against a simulated area detector.
//!
//! Stages a streaming detector backed by simulated hardware, acquires a
//! number of frames while collecting stream documents, and prints every
//! document as one JSON line on stdout.
//!
//! ```text
//! ad-flyscan --frames 20 --exposure 0.05
//! RUST_LOG=areadetector_daq=debug ad-flyscan --config config/areadetector.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use areadetector_daq::areadetector::{
    AdDriver, DirectoryProvider, HdfStreamerDet, NdFileHdf, SimDetector, StaticDirectoryProvider,
    TmpDirectoryProvider,
};
use areadetector_daq::config::{DaqConfig, DEFAULT_CONFIG_PATH};
use areadetector_daq::fly::fly;
use clap::Parser;
use daq_core::device::{Collectable, Configurable, Stageable};
use daq_core::sim::set_sim_value;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ad-flyscan", version, about = "Fly scan a simulated area detector")]
struct Args {
    /// Number of frames to acquire
    #[arg(short = 'n', long, default_value_t = 10)]
    frames: i64,

    /// Exposure time per frame in seconds
    #[arg(short, long, default_value_t = 0.01)]
    exposure: f64,

    /// Detector name, also the prefix of every signal name
    #[arg(long, default_value = "det")]
    name: String,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the stall budget in seconds
    #[arg(long)]
    stall_timeout: Option<f64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DaqConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(secs) = args.stall_timeout {
        config.detector.stall_timeout_secs = secs;
        config.validate()?;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("areadetector_daq={}", config.application.log_level))),
        )
        .init();

    if args.show_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let directory_provider: Arc<dyn DirectoryProvider> = match &config.application.data_dir {
        Some(dir) => Arc::new(StaticDirectoryProvider::new(dir)),
        None => Arc::new(TmpDirectoryProvider::new()?),
    };

    let drv = AdDriver::sim(&format!("{}:DRV:", args.name.to_uppercase()), &format!("{}-drv", args.name));
    let hdf = NdFileHdf::sim(&format!("{}:HDF:", args.name.to_uppercase()), &format!("{}-hdf", args.name));
    let _hardware = SimDetector::default().attach(&drv, &hdf)?;
    set_sim_value(&drv.acquire_time, args.exposure)?;

    let poll_interval = config.detector.poll_interval();
    let mut det = HdfStreamerDet::new(&args.name, drv, hdf, directory_provider, config.detector.clone());

    tracing::info!(
        app = %config.application.name,
        detector = %args.name,
        frames = args.frames,
        exposure = args.exposure,
        "starting fly scan"
    );

    let describe = det.describe_collect().await?;
    let configuration = det.read_configuration().await?;
    println!(
        "{}",
        serde_json::json!({ "name": "descriptor", "doc": { "data_keys": describe, "configuration": configuration } })
    );

    det.stage().await?;
    let scanned = fly(&mut det, args.frames, poll_interval).await;
    // Unstage even when the scan failed so the writer is disarmed
    let unstaged = det.unstage().await;
    let assets = scanned.context("fly scan failed")?;
    unstaged.context("unstage failed")?;

    for asset in &assets {
        println!("{}", serde_json::to_string(asset)?);
    }
    tracing::info!(documents = assets.len(), "done");
    Ok(())
}
