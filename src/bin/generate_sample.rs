//! Write a small synthetic MCS archive for trying out the viewer and loaders.
//!
//! ```text
//! generate_sample ./mcs-sample --start 16010100 --count 6
//! MCS_DATA_DIR_BASE=./mcs-sample mcs-tools --filestr 16010100
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;

use mcs_tools::data::source::FileStamp;
use mcs_tools::data::synthetic::{SyntheticArchive, SyntheticL1B, SyntheticL2};
use mcs_tools::time::FILE_HOURS;

#[derive(Parser, Debug)]
#[command(version, about = "Write a synthetic MCS L1B/L2 archive")]
struct Args {
    /// Archive root; `level_1b/` and `level_2_2d/` are created below it.
    dir: PathBuf,

    /// First window, as YYMMDDHH[MM[SS]].
    #[arg(long, default_value = "16010100")]
    start: String,

    /// Number of consecutive 4-hour windows.
    #[arg(long, default_value_t = 6)]
    count: usize,

    /// Limb sequences per L1B file.
    #[arg(long, default_value_t = 24)]
    sequences: usize,

    /// Profiles per L2 file.
    #[arg(long, default_value_t = 12)]
    profiles: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    anyhow::ensure!(args.count > 0, "--count must be at least 1");
    let first = FileStamp::parse(&args.start)?;
    let last = first.datetime() + Duration::hours(FILE_HOURS as i64 * args.count.saturating_sub(1) as i64);
    let stamps = FileStamp::range(first.datetime(), last);

    let archive = SyntheticArchive {
        l1b: SyntheticL1B {
            sequences: args.sequences,
            seed: args.seed,
            ..SyntheticL1B::default()
        },
        l2: SyntheticL2 {
            profiles: args.profiles,
            seed: args.seed,
        },
    };
    let written = archive
        .write(&args.dir, &stamps)
        .with_context(|| format!("writing archive under {}", args.dir.display()))?;

    println!(
        "Wrote {} files ({} windows from {first}) to {}",
        written.len(),
        stamps.len(),
        args.dir.display()
    );
    Ok(())
}
