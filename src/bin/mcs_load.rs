//! Load MCS data over a date range and write it out or preview it.
//!
//! ```text
//! mcs_load --mcs-data-path /data/mcs l1b --start 2016-01-01 --end 2016-01-01T12:00 \
//!     --preprocess standard -o radiances.parquet
//! mcs_load --pds l2 --start 2012-08-01 --end 2012-08-02 --ddr 2 \
//!     --profiles-within '{"Profile_lat": {"between": [-10, 10]}}'
//! mcs_load l2 --ls 33:0:30 --bins '{"Profile_lat": [-90, 90, 5]}' \
//!     --within-bin-of '{"Profile_lat": 12.3}' --ddr 2
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};

use mcs_tools::config::{load_dotenv, ENV_DATA_DIR};
use mcs_tools::data::export;
use mcs_tools::data::filter::FilterConfig;
use mcs_tools::data::loader::{merge_ddrs, profile_ids};
use mcs_tools::data::reader::{read_file, Product};
use mcs_tools::data::source::SourceRef;
use mcs_tools::preprocess::{
    preprocessor_by_name, BinConfig, L1BOnPlanetInTrack, L1BPreprocessor, OnPlanetFinder,
};
use mcs_tools::{Config, Ddr, L1BLoader, L2Loader, Level, LoadOutcome, ReadOptions, RecordSet};

#[derive(Parser, Debug)]
#[command(version, about = "Load Mars Climate Sounder L1B / L2 data")]
struct Cli {
    /// Load from the PDS archive instead of a local directory.
    #[arg(long, global = true)]
    pds: bool,

    /// Root of the local MCS archive.
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    mcs_data_path: Option<PathBuf>,

    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Level 1B radiances.
    L1b {
        /// Range start, e.g. `2016-01-01` or `2016-01-01T04:00:00`.
        #[arg(long, value_parser = parse_datetime, required_unless_present = "around")]
        start: Option<NaiveDateTime>,

        /// Range end (inclusive).
        #[arg(long, value_parser = parse_datetime, required_unless_present = "around")]
        end: Option<NaiveDateTime>,

        /// Load the file holding this date (and `--neighbours` either side)
        /// instead of a range.
        #[arg(long, value_parser = parse_datetime, conflicts_with_all = ["start", "end"])]
        around: Option<NaiveDateTime>,

        #[arg(long, default_value_t = 1, requires = "around")]
        neighbours: usize,

        /// Pair every output row with the closest on-planet view taken within
        /// this many seconds.
        #[arg(long, value_name = "SECONDS")]
        closest_onplanet: Option<i64>,

        /// Reduce to one viewing geometry: `standard` or `onplanet`.
        #[arg(long)]
        preprocess: Option<String>,

        /// Add the Mars Year column.
        #[arg(long)]
        mars_year: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Level 2 derived data records.
    L2 {
        #[arg(long, value_parser = parse_datetime, required_unless_present = "ls")]
        start: Option<NaiveDateTime>,

        #[arg(long, value_parser = parse_datetime, required_unless_present = "ls")]
        end: Option<NaiveDateTime>,

        /// Solar longitude range instead of dates, as `MY:START:END`.
        #[arg(long, value_parser = parse_ls_range, conflicts_with_all = ["start", "end"])]
        ls: Option<LsRange>,

        /// Data record: 1-4 (PDS files carry 1 and 2 only).
        #[arg(long, default_value = "DDR1")]
        ddr: Ddr,

        /// Keep only profiles whose DDR1 row passes this filter (JSON or file).
        #[arg(long)]
        profiles_within: Option<String>,

        /// Join each profile's DDR1 columns onto DDR2 rows.
        #[arg(long)]
        merge_ddr1: bool,

        /// Bin edges per column as `[start, stop, step]` (JSON or file); adds
        /// `<column>_mid` columns.
        #[arg(long)]
        bins: Option<String>,

        /// Keep only profiles in the bin holding this location, e.g.
        /// `{"Profile_lat": 12.3}`.
        #[arg(long, requires = "bins")]
        within_bin_of: Option<String>,

        #[arg(long)]
        mars_year: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// One file, local or remote, typed by its name.
    File {
        /// Path or URL of a `.L1B`, `.L2`, `_RDR.TAB` or `_DDR.TAB` file.
        source: String,

        /// Data record to read from an L2 file.
        #[arg(long, default_value = "DDR1")]
        ddr: Ddr,

        #[arg(long)]
        preprocess: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Row filter applied before output (JSON or file).
    #[arg(long)]
    filter: Option<String>,

    /// Write to a `.csv` or `.parquet` file instead of printing a preview.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rows shown in the preview.
    #[arg(long, default_value_t = 10)]
    rows: usize,
}

/// Mars Years accepted by `--ls`; MY 1 began in 1955.
const MARS_YEARS: std::ops::RangeInclusive<i64> = 1..=200;

#[derive(Debug, Clone, Copy)]
struct LsRange {
    mars_year: i64,
    start: f64,
    end: f64,
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| format!("cannot parse date '{s}', expected YYYY-MM-DD[THH:MM[:SS]]"))
}

fn parse_ls_range(s: &str) -> Result<LsRange, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [my, start, end] = parts.as_slice() else {
        return Err(format!("expected MY:START:END, got '{s}'"));
    };
    let num = |p: &str| p.trim().parse::<f64>().map_err(|e| format!("'{p}': {e}"));
    let mars_year: i64 = my.trim().parse().map_err(|e| format!("'{my}': {e}"))?;
    if !MARS_YEARS.contains(&mars_year) {
        return Err(format!(
            "Mars Year {mars_year} outside {}..={}",
            MARS_YEARS.start(),
            MARS_YEARS.end()
        ));
    }
    Ok(LsRange {
        mars_year,
        start: num(*start)?,
        end: num(*end)?,
    })
}

/// A filter given inline as JSON or as a path to a JSON file.
fn load_filter(arg: &str) -> Result<FilterConfig> {
    let filter = if arg.trim_start().starts_with('{') {
        FilterConfig::from_json(arg)?
    } else {
        FilterConfig::from_file(Path::new(arg))?
    };
    Ok(filter)
}

/// Bins given inline as JSON or as a path to a JSON file.
fn load_bins(arg: &str) -> Result<BinConfig> {
    let bins = if arg.trim_start().starts_with('{') {
        BinConfig::from_json(arg)?
    } else {
        BinConfig::from_file(Path::new(arg))?
    };
    Ok(bins)
}

/// Profile selection from `--profiles-within` and `--within-bin-of` together.
fn profile_filter(
    profiles_within: Option<&str>,
    bins: Option<&BinConfig>,
    within_bin_of: Option<&str>,
) -> Result<Option<FilterConfig>> {
    let mut filter = profiles_within.map(load_filter).transpose()?;
    if let (Some(bins), Some(location)) = (bins, within_bin_of) {
        let location: BTreeMap<String, f64> =
            serde_json::from_str(location).context("parsing --within-bin-of")?;
        let in_bin = bins.location_filter(&location)?;
        filter.get_or_insert_with(FilterConfig::default).0.extend(in_bin.0);
    }
    Ok(filter)
}

fn report(outcome: LoadOutcome) -> RecordSet {
    for missing in &outcome.unresolved {
        log::warn!("{}: {}", missing.source, missing.reason);
    }
    if !outcome.is_complete() {
        log::warn!("{} file(s) could not be loaded", outcome.unresolved.len());
    }
    outcome.into_records()
}

fn emit(records: RecordSet, output: &OutputArgs) -> Result<()> {
    let records = match &output.filter {
        Some(f) => load_filter(f)?.apply(&records).context("applying --filter")?,
        None => records,
    };
    match &output.output {
        Some(path) => {
            export::write_file(&records, path)?;
            log::info!("Wrote {} rows to {}", records.len(), path.display());
        }
        None => {
            println!("{}", export::preview(&records, output.rows)?);
            println!("{} rows × {} columns", records.len(), records.columns().len());
        }
    }
    Ok(())
}

fn preprocessor(name: Option<&str>) -> Result<Option<Box<dyn L1BPreprocessor>>> {
    match name {
        Some(name) => match preprocessor_by_name(name) {
            Some(p) => Ok(Some(p)),
            None => bail!("unknown preprocessor '{name}', expected standard or onplanet"),
        },
        None => Ok(None),
    }
}

fn apply_preprocessor(p: Option<Box<dyn L1BPreprocessor>>, records: RecordSet) -> Result<RecordSet> {
    match p {
        Some(p) => {
            let processed = p.preprocess(&records)?;
            log::info!("{}: {} → {} rows", p.name(), records.len(), processed.len());
            Ok(processed)
        }
        None => Ok(records),
    }
}

fn run_file(source: &str, ddr: Ddr, preprocess: Option<&str>) -> Result<RecordSet> {
    let source = SourceRef::parse(source);
    let product = match Product::level_from_name(&source.file_name()) {
        Some(Level::L1B) => Product::L1B,
        Some(Level::L2) => Product::L2(ddr),
        None => bail!("cannot tell the product of {source} from its name"),
    };
    let p = preprocessor(preprocess)?;
    if p.is_some() && product != Product::L1B {
        bail!("--preprocess only applies to L1B files");
    }
    let records = read_file(&source, product, ReadOptions::with_datetime())
        .with_context(|| format!("reading {source}"))?;
    apply_preprocessor(p, records)
}

/// What part of the L1B archive to read.
#[derive(Debug, Clone, Copy)]
enum L1BSpan {
    Range(NaiveDateTime, NaiveDateTime),
    Around(NaiveDateTime, usize),
}

impl L1BSpan {
    fn from_args(
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        around: Option<NaiveDateTime>,
        neighbours: usize,
    ) -> Result<Self> {
        match (around, start, end) {
            (Some(date), _, _) => Ok(L1BSpan::Around(date, neighbours)),
            (None, Some(start), Some(end)) => Ok(L1BSpan::Range(start, end)),
            _ => bail!("give either --start and --end or --around"),
        }
    }
}

fn run_l1b(
    config: &Config,
    span: L1BSpan,
    preprocess: Option<&str>,
    closest_onplanet: Option<i64>,
    mars_year: bool,
) -> Result<RecordSet> {
    let p = preprocessor(preprocess)?;
    let mut loader = L1BLoader::from_config(config)?;
    if mars_year {
        loader = loader.with_mars_year();
    }
    let raw = match span {
        L1BSpan::Range(start, end) => report(loader.load_date_range(start, end)?),
        L1BSpan::Around(date, n) => {
            log::info!("Loading L1B files around {date} (±{n})");
            report(loader.load_files_around_date(date, n))
        }
    };
    let records = apply_preprocessor(p, raw.clone())?;
    match closest_onplanet {
        Some(seconds) => {
            let on_planet = L1BOnPlanetInTrack::default().preprocess(&raw)?;
            log::info!("{} on-planet views to pair with", on_planet.len());
            Ok(OnPlanetFinder::new(seconds).add_closest_columns(&records, &on_planet)?)
        }
        None => Ok(records),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_l2(
    config: &Config,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    ls: Option<LsRange>,
    ddr: Ddr,
    profiles_within: Option<&str>,
    merge_ddr1: bool,
    bins: Option<&str>,
    within_bin_of: Option<&str>,
    mars_year: bool,
) -> Result<RecordSet> {
    let bins = bins.map(load_bins).transpose()?;
    let mut loader = L2Loader::from_config(config)?;
    if mars_year {
        loader = loader.with_mars_year();
    }

    let load_span = |ddr: Ddr| -> Result<LoadOutcome> {
        match (ls, start, end) {
            (Some(ls), _, _) => Ok(loader.load_ls_range(ls.mars_year, ls.start, ls.end, ddr)?),
            (None, Some(start), Some(end)) => Ok(loader.load_date_range(start, end, ddr, None)?),
            _ => bail!("give either --start and --end or --ls"),
        }
    };

    if merge_ddr1 && ddr != Ddr::Ddr2 {
        bail!("--merge-ddr1 only applies to --ddr 2");
    }

    let records = match profile_filter(profiles_within, bins.as_ref(), within_bin_of)? {
        Some(filter) => {
            let ddr1 = report(load_span(Ddr::Ddr1)?);
            let ids = profile_ids(&filter.apply(&ddr1).context("selecting profiles")?)?;
            log::info!("{} of {} profiles selected", ids.len(), ddr1.len());
            report(loader.load_profiles(ddr, &ids)?)
        }
        None => report(load_span(ddr)?),
    };

    let records = if merge_ddr1 {
        let ids = profile_ids(&records)?;
        let ddr1 = report(loader.load_profiles(Ddr::Ddr1, &ids)?);
        merge_ddrs(&records, &ddr1)?
    } else {
        records
    };

    match bins {
        Some(bins) => {
            let binned = bins.bin_profiles(&records).context("binning profiles")?;
            let occupied = bins.profiles_by_bin(&binned)?;
            log::info!("Profiles fall in {} occupied bins", occupied.len());
            Ok(binned)
        }
        None => Ok(records),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    load_dotenv();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.pds, cli.mcs_data_path);

    match cli.command {
        Command::L1b {
            start,
            end,
            around,
            neighbours,
            closest_onplanet,
            preprocess,
            mars_year,
            output,
        } => {
            let span = L1BSpan::from_args(start, end, around, neighbours)?;
            let records = run_l1b(&config, span, preprocess.as_deref(), closest_onplanet, mars_year)?;
            emit(records, &output)
        }
        Command::L2 {
            start,
            end,
            ls,
            ddr,
            profiles_within,
            merge_ddr1,
            bins,
            within_bin_of,
            mars_year,
            output,
        } => {
            let records = run_l2(
                &config,
                start,
                end,
                ls,
                ddr,
                profiles_within.as_deref(),
                merge_ddr1,
                bins.as_deref(),
                within_bin_of.as_deref(),
                mars_year,
            )?;
            emit(records, &output)
        }
        Command::File {
            source,
            ddr,
            preprocess,
            output,
        } => {
            let records = run_file(&source, ddr, preprocess.as_deref())?;
            emit(records, &output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_parse_with_and_without_time() {
        let day = parse_datetime("2016-01-01").unwrap();
        assert_eq!(day.to_string(), "2016-01-01 00:00:00");
        let hour = parse_datetime("2016-01-01T04:30").unwrap();
        assert_eq!(hour.to_string(), "2016-01-01 04:30:00");
        assert!(parse_datetime("01/01/2016").is_err());
    }

    #[test]
    fn ls_range_needs_three_parts() {
        let ls = parse_ls_range("33:0:30").unwrap();
        assert_eq!((ls.mars_year, ls.start, ls.end), (33, 0.0, 30.0));
        assert!(parse_ls_range("33:0").is_err());
        assert!(parse_ls_range("x:0:30").is_err());
        assert!(parse_ls_range("400000:0:30").is_err());
        assert!(parse_ls_range("0:0:30").is_err());
    }

    #[test]
    fn file_product_comes_from_the_name() {
        let err = run_file("notes.txt", Ddr::Ddr1, None).unwrap_err();
        assert!(err.to_string().contains("cannot tell the product"));
        let err = run_file("160101000000.L2", Ddr::Ddr1, Some("standard")).unwrap_err();
        assert!(err.to_string().contains("only applies to L1B"));
        assert!(preprocessor(Some("nadir")).is_err());
    }

    #[test]
    fn cli_requires_a_range() {
        assert!(Cli::try_parse_from(["mcs_load", "l2", "--ddr", "2"]).is_err());
        let cli = Cli::try_parse_from(["mcs_load", "l2", "--ls", "33:0:30", "--ddr", "2"]).unwrap();
        assert!(matches!(cli.command, Command::L2 { ddr: Ddr::Ddr2, .. }));

        assert!(Cli::try_parse_from(["mcs_load", "l1b", "--start", "2016-01-01"]).is_err());
        let cli = Cli::try_parse_from(["mcs_load", "l1b", "--around", "2016-01-01T05:00", "--neighbours", "2"])
            .unwrap();
        assert!(matches!(cli.command, Command::L1b { neighbours: 2, start: None, .. }));
        assert!(Cli::try_parse_from([
            "mcs_load", "l1b", "--around", "2016-01-01", "--start", "2016-01-01", "--end", "2016-01-02"
        ])
        .is_err());
    }

    #[test]
    fn bin_location_needs_bins() {
        assert!(Cli::try_parse_from([
            "mcs_load", "l2", "--ls", "33:0:30", "--within-bin-of", r#"{"Profile_lat": 1}"#
        ])
        .is_err());
    }

    #[test]
    fn bin_location_joins_the_profile_filter() {
        let bins = load_bins(r#"{"Profile_lat": [-90, 90, 5]}"#).unwrap();
        let filter = profile_filter(
            Some(r#"{"Gqual": {"in": [0]}}"#),
            Some(&bins),
            Some(r#"{"Profile_lat": 12.3}"#),
        )
        .unwrap()
        .unwrap();
        assert_eq!(filter.0.len(), 2);
        assert!(profile_filter(None, None, None).unwrap().is_none());
        assert!(profile_filter(None, Some(&bins), Some(r#"{"L_s": 3}"#)).is_err());
    }

    #[test]
    fn l1b_around_a_date_with_onplanet_pairs() {
        use mcs_tools::data::source::FileStamp;
        use mcs_tools::data::synthetic::SyntheticArchive;
        use mcs_tools::preprocess::onplanet::CLOSEST_OP_DISTANCE_COLUMN;

        let dir = tempfile::tempdir().unwrap();
        let stamps: Vec<FileStamp> = ["160101000000", "160101040000", "160101080000"]
            .iter()
            .map(|s| FileStamp::parse(s).unwrap())
            .collect();
        SyntheticArchive::default().write(dir.path(), &stamps).unwrap();
        let config = Config::default().with_overrides(false, Some(dir.path().to_path_buf()));

        let around = parse_datetime("2016-01-01T05:00").unwrap();
        let all = run_l1b(&config, L1BSpan::Around(around, 1), None, None, false).unwrap();
        let one = run_l1b(&config, L1BSpan::Around(around, 0), None, None, false).unwrap();
        assert!(one.len() < all.len());

        let paired = run_l1b(&config, L1BSpan::Around(around, 0), Some("standard"), Some(1200), false)
            .unwrap();
        assert!(paired.has_column(CLOSEST_OP_DISTANCE_COLUMN));
    }
}
