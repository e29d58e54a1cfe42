mod app;
mod color;
mod state;
mod ui;

use std::path::PathBuf;

use app::McsApp;
use clap::Parser;
use eframe::egui;

use mcs_tools::config::{load_dotenv, ENV_DATA_DIR};
use mcs_tools::data::source::FileStamp;
use mcs_tools::Config;
use state::AppState;

/// Browse MCS Level 1B radiance panels and Level 2 profile locations.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Load from the PDS archive instead of a local directory.
    #[arg(long)]
    pds: bool,

    /// Root of the local MCS archive.
    #[arg(long, env = ENV_DATA_DIR)]
    mcs_data_path: Option<PathBuf>,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Window to load on start, as YYMMDDHH[MM[SS]].
    #[arg(long)]
    filestr: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    load_dotenv();
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?.with_overrides(args.pds, args.mcs_data_path);
    let stamp = args.filestr.as_deref().map(FileStamp::parse).transpose()?;
    log::info!("Starting viewer with {config:?}");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "MCS Panel Viewer",
        options,
        Box::new(move |_cc| {
            let state = AppState::new(config, stamp);
            Ok(Box::new(McsApp::new(state, stamp.is_some())))
        }),
    )
    .map_err(|e| anyhow::anyhow!("viewer failed: {e}"))
}
