pub mod analysis;
pub mod capture;
mod console;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod settings;
pub mod storage;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;

use analysis::{RetinaAnalyzer, SimulatedAnalyzer};
use capture::FileCaptureSource;
use db::Database;
use pipeline::CapturePipeline;
use settings::SettingsStore;
use storage::ScanStore;

#[derive(Debug, Parser)]
#[command(name = "retina-guardian", about = "Simulated retina scan authentication")]
struct Args {
    /// Directory holding the scan database and settings.json
    #[arg(long, env = "RETINA_GUARDIAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Image file read as the camera frame on every scan
    #[arg(long, default_value = "frame.png")]
    frame: PathBuf,

    /// Seed for the simulated analyzer, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("retina-guardian"))
        .ok_or_else(|| anyhow!("no platform data directory; pass --data-dir"))
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    info!("Retina Guardian starting up...");

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("retina_guardian.sqlite3"))?;
    let store = ScanStore::new(Arc::new(database));
    let settings = SettingsStore::new(data_dir.join("settings.json"))?.pipeline();

    let analyzer: Arc<dyn RetinaAnalyzer> = match args.seed {
        Some(seed) => Arc::new(SimulatedAnalyzer::seeded(seed)),
        None => Arc::new(SimulatedAnalyzer::new()),
    };
    let camera = Arc::new(FileCaptureSource::new(args.frame, settings.capture_warmup()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let saved_at = store.load().await.and_then(|record| record.saved_at());
        match (saved_at, store.exists().await) {
            (Some(saved_at), _) => info!(
                "Stored retina data found, last saved {}",
                analysis::charts::format_scan_date(saved_at.with_timezone(&chrono::Local))
            ),
            (None, true) => {
                info!("Stored retina data is unreadable; scans cannot be verified until it is deleted")
            }
            (None, false) => info!("No stored retina data"),
        }

        let pipeline = CapturePipeline::new(store, analyzer, camera, settings).await;
        console::run_console(pipeline).await
    })
}
