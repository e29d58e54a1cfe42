use std::collections::BTreeSet;
use std::fmt;

use chrono::{Duration, NaiveDateTime};

use super::filter::{select_half_open, select_time_range, select_values};
use super::model::{RecordSet, Value};
use super::reader::{L1BReader, L2Reader, ReadOptions};
use super::schema::{Ddr, L2Layout, Level, PROFILE_ID_COLUMN};
use super::source::{FileStamp, FilenameBuilder, SourceRef, IGNORED_FILES};
use crate::config::Config;
use crate::error::{McsError, Result};
use crate::time::mars_year_ls_to_utc;

/// Slack added either side of an Ls range once converted to dates.
const LS_RANGE_SLACK_DAYS: i64 = 2;

/// Precision of the Ls → date conversion, degrees.
const LS_THRESH: f64 = 0.001;

// ---------------------------------------------------------------------------
// LoadOutcome
// ---------------------------------------------------------------------------

/// Why a file of a requested range did not contribute rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No file at the expected location (or HTTP 404).
    Missing,
    /// The file exists but could not be read or parsed.
    Unreadable(String),
    /// Listed as a known-bad file.
    Ignored,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::Missing => f.write_str("missing"),
            UnresolvedReason::Unreadable(reason) => write!(f, "unreadable: {reason}"),
            UnresolvedReason::Ignored => f.write_str("ignored"),
        }
    }
}

/// A file the loader skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub stamp: Option<FileStamp>,
    pub source: SourceRef,
    pub reason: UnresolvedReason,
}

/// Rows of every file that could be read, plus the files that could not.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub records: RecordSet,
    pub unresolved: Vec<Unresolved>,
}

impl LoadOutcome {
    /// True when every requested file contributed.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn into_records(self) -> RecordSet {
        self.records
    }

    /// Apply `f` to the records, keeping the unresolved list.
    pub fn try_map_records<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(&RecordSet) -> Result<RecordSet>,
    {
        Ok(LoadOutcome {
            records: f(&self.records)?,
            unresolved: self.unresolved,
        })
    }
}

fn is_ignored(stamp: Option<FileStamp>, level: Level) -> bool {
    stamp.is_some_and(|s| {
        let name = format!("{}.{}", s.gds(), level.file_suffix());
        IGNORED_FILES.contains(&name.as_str())
    })
}

/// Read every source in stamp order and concatenate. Per-file failures are
/// logged and collected instead of aborting the load.
fn read_sources<F>(
    sources: &[SourceRef],
    level: Level,
    columns: Vec<String>,
    mut read: F,
) -> LoadOutcome
where
    F: FnMut(&SourceRef) -> Result<RecordSet>,
{
    let mut ordered: Vec<(Option<FileStamp>, &SourceRef)> = sources
        .iter()
        .map(|s| (FileStamp::from_source(s).ok(), s))
        .collect();
    ordered.sort_by_key(|(stamp, _)| *stamp);

    log::info!("Loading {} {level} file(s)", ordered.len());
    let mut records = RecordSet::new(columns);
    let mut unresolved = Vec::new();

    for (stamp, source) in ordered {
        let reason = if is_ignored(stamp, level) {
            log::warn!("Skipping known-bad file {source}");
            UnresolvedReason::Ignored
        } else {
            match read(source).and_then(|rs| records.extend(rs)) {
                Ok(()) => {
                    log::debug!("Loaded {source}");
                    continue;
                }
                Err(e) if e.is_not_found() => {
                    log::warn!("{source} not found, skipping");
                    UnresolvedReason::Missing
                }
                Err(e) => {
                    log::warn!("Could not read {source}: {e}");
                    UnresolvedReason::Unreadable(e.to_string())
                }
            }
        };
        unresolved.push(Unresolved {
            stamp,
            source: source.clone(),
            reason,
        });
    }

    log::info!(
        "Loaded {} rows, {} file(s) unresolved",
        records.len(),
        unresolved.len()
    );
    LoadOutcome {
        records,
        unresolved,
    }
}

/// The window containing `date` and `n` windows either side.
fn stamps_around(date: NaiveDateTime, n: usize) -> Vec<FileStamp> {
    let centre = FileStamp::containing(date);
    let mut first = centre;
    for _ in 0..n {
        first = first.prev();
    }
    std::iter::successors(Some(first), |s| Some(s.next()))
        .take(2 * n + 1)
        .collect()
}

// ---------------------------------------------------------------------------
// L1B
// ---------------------------------------------------------------------------

/// Loads L1B data spanning many files.
#[derive(Debug, Clone)]
pub struct L1BLoader {
    filenames: FilenameBuilder,
    reader: L1BReader,
}

impl L1BLoader {
    pub fn new(filenames: FilenameBuilder) -> Self {
        Self {
            filenames,
            reader: L1BReader::new(ReadOptions::with_datetime()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(FilenameBuilder::from_config(Level::L1B, config)?))
    }

    /// Also add the Mars Year column to every row.
    pub fn with_mars_year(mut self) -> Self {
        self.reader = L1BReader::new(ReadOptions {
            datetime: true,
            mars_year: true,
        });
        self
    }

    pub fn filenames(&self) -> &FilenameBuilder {
        &self.filenames
    }

    pub fn columns(&self) -> Vec<String> {
        self.reader.output_columns()
    }

    /// Read an explicit list of files.
    pub fn load(&self, sources: &[SourceRef]) -> LoadOutcome {
        read_sources(sources, Level::L1B, self.columns(), |s| self.reader.read(s))
    }

    /// All rows with `start <= dt <= end`.
    pub fn load_date_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<LoadOutcome> {
        log::info!("Loading L1B data from {start} - {end}");
        let sources: Vec<SourceRef> = self
            .filenames
            .sources_for_range(start, end)?
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        self.load(&sources)
            .try_map_records(|rs| select_time_range(rs, start, end))
    }

    /// Read exactly the file of one stamp, e.g. `1601010000`.
    pub fn load_from_filestr(&self, filestr: &str) -> Result<RecordSet> {
        let (_, source) = self.filenames.source_from_filestr(filestr)?;
        self.reader.read(&source)
    }

    /// The file containing `date` plus `n` files either side.
    pub fn load_files_around_date(&self, date: NaiveDateTime, n: usize) -> LoadOutcome {
        let sources: Vec<SourceRef> = stamps_around(date, n)
            .into_iter()
            .map(|s| self.filenames.source_for(s))
            .collect();
        self.load(&sources)
    }
}

// ---------------------------------------------------------------------------
// L2
// ---------------------------------------------------------------------------

/// Loads one L2 data record spanning many files.
#[derive(Debug, Clone)]
pub struct L2Loader {
    filenames: FilenameBuilder,
    reader: L2Reader,
}

impl L2Loader {
    /// PDS archives only ship DDR1 and DDR2; local archives carry all four.
    pub fn new(filenames: FilenameBuilder) -> Self {
        let layout = if filenames.is_pds() {
            L2Layout::Pds
        } else {
            L2Layout::Full
        };
        Self {
            filenames,
            reader: L2Reader::new(layout, ReadOptions::with_datetime()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(FilenameBuilder::from_config(Level::L2, config)?))
    }

    pub fn with_mars_year(mut self) -> Self {
        self.reader = L2Reader::new(
            self.reader.layout(),
            ReadOptions {
                datetime: true,
                mars_year: true,
            },
        );
        self
    }

    pub fn filenames(&self) -> &FilenameBuilder {
        &self.filenames
    }

    pub fn columns(&self, ddr: Ddr) -> Vec<String> {
        self.reader.output_columns(ddr)
    }

    fn check_ddr(&self, ddr: Ddr) -> Result<()> {
        let layout = self.reader.layout();
        if layout.contains(ddr) {
            Ok(())
        } else {
            Err(McsError::Config(format!(
                "{ddr} is not available in {layout:?} L2 files"
            )))
        }
    }

    /// Read an explicit list of files, optionally keeping only `profiles`.
    pub fn load(
        &self,
        sources: &[SourceRef],
        ddr: Ddr,
        profiles: Option<&BTreeSet<String>>,
    ) -> Result<LoadOutcome> {
        self.check_ddr(ddr)?;
        let outcome = read_sources(sources, Level::L2, self.columns(ddr), |s| {
            self.reader.read(s, ddr)
        });
        match profiles {
            Some(ids) => outcome.try_map_records(|rs| restrict_to_profiles(rs, ids)),
            None => Ok(outcome),
        }
    }

    /// All `ddr` rows whose profile time lies in `start ..= end`.
    pub fn load_date_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        ddr: Ddr,
        profiles: Option<&BTreeSet<String>>,
    ) -> Result<LoadOutcome> {
        log::info!("Loading L2 {ddr} data from {start} - {end}");
        let sources: Vec<SourceRef> = self
            .filenames
            .sources_for_range(start, end)?
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        self.load(&sources, ddr, profiles)?
            .try_map_records(|rs| select_time_range(rs, start, end))
    }

    pub fn load_from_filestr(&self, filestr: &str, ddr: Ddr) -> Result<RecordSet> {
        self.check_ddr(ddr)?;
        let (_, source) = self.filenames.source_from_filestr(filestr)?;
        self.reader.read(&source, ddr)
    }

    /// Profiles `numbers` of the file for one stamp.
    pub fn load_from_filebase_profiles(
        &self,
        filestr: &str,
        numbers: &[usize],
        ddr: Ddr,
    ) -> Result<RecordSet> {
        let (stamp, _) = self.filenames.source_from_filestr(filestr)?;
        let ids: BTreeSet<String> = numbers
            .iter()
            .map(|n| format!("{}_{n}", stamp.gds()))
            .collect();
        let rs = self.load_from_filestr(filestr, ddr)?;
        restrict_to_profiles(&rs, &ids)
    }

    /// Load exactly the profiles named by `ids`, reading only the files
    /// their identifiers point at.
    pub fn load_profiles(&self, ddr: Ddr, ids: &BTreeSet<String>) -> Result<LoadOutcome> {
        let stamps: BTreeSet<FileStamp> = ids
            .iter()
            .map(|id| {
                super::reader::split_profile_id(id)
                    .map(|(stamp, _)| stamp)
                    .ok_or_else(|| McsError::InvalidStamp(id.clone()))
            })
            .collect::<Result<_>>()?;
        let sources: Vec<SourceRef> = stamps
            .into_iter()
            .map(|s| self.filenames.source_for(s))
            .collect();
        self.load(&sources, ddr, Some(ids))
    }

    /// Rows of Mars Year `my` between two solar longitudes.
    ///
    /// DDR1 rows are held to `start_ls <= L_s < end_ls`; other records keep
    /// the whole date span, which is padded by a couple of days.
    pub fn load_ls_range(
        &self,
        my: i64,
        start_ls: f64,
        end_ls: f64,
        ddr: Ddr,
    ) -> Result<LoadOutcome> {
        log::info!("Determining approximate start/end dates for MY{my}, Ls range: {start_ls} - {end_ls}");
        let slack = Duration::days(LS_RANGE_SLACK_DAYS);
        let to_utc = |ls: f64, pad: Duration| {
            mars_year_ls_to_utc(my, ls, LS_THRESH)
                .and_then(|date| date.checked_add_signed(pad))
                .ok_or_else(|| McsError::Config(format!("could not find a date for MY{my} Ls {ls}")))
        };
        let start = to_utc(start_ls, -slack)?;
        let end = to_utc(end_ls, slack)?;
        let outcome = self.load_date_range(start, end, ddr, None)?;
        if ddr != Ddr::Ddr1 {
            return Ok(outcome);
        }
        outcome.try_map_records(|rs| select_half_open(rs, "L_s", start_ls, end_ls))
    }

    /// The file containing `date` plus `n` files either side.
    pub fn load_files_around_date(
        &self,
        date: NaiveDateTime,
        n: usize,
        ddr: Ddr,
    ) -> Result<LoadOutcome> {
        let sources: Vec<SourceRef> = stamps_around(date, n)
            .into_iter()
            .map(|s| self.filenames.source_for(s))
            .collect();
        self.load(&sources, ddr, None)
    }
}

/// Keep rows whose profile identifier is in `ids`.
pub fn restrict_to_profiles(records: &RecordSet, ids: &BTreeSet<String>) -> Result<RecordSet> {
    let values: BTreeSet<Value> = ids.iter().map(|id| Value::Text(id.clone())).collect();
    select_values(records, PROFILE_ID_COLUMN, &values)
}

/// Profile identifiers present in a record set.
pub fn profile_ids(records: &RecordSet) -> Result<BTreeSet<String>> {
    Ok(records
        .column(PROFILE_ID_COLUMN)?
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

/// Attach each profile's DDR1 columns to its DDR2 rows.
pub fn merge_ddrs(ddr2: &RecordSet, ddr1: &RecordSet) -> Result<RecordSet> {
    ddr2.left_join(ddr1, PROFILE_ID_COLUMN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn stamps_around_centre() {
        let stamps = stamps_around(at(2016, 1, 1, 5), 1);
        let names: Vec<String> = stamps.iter().map(|s| s.gds()).collect();
        assert_eq!(names, ["160101000000", "160101040000", "160101080000"]);
    }

    #[test]
    fn known_bad_file_is_ignored() {
        let bad = FileStamp::parse("150826040000").unwrap();
        assert!(is_ignored(Some(bad), Level::L1B));
        assert!(!is_ignored(Some(bad), Level::L2));
        assert!(!is_ignored(None, Level::L1B));
    }

    #[test]
    fn missing_files_are_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let loader = L1BLoader::new(FilenameBuilder::directory(Level::L1B, dir.path(), "level_1b"));
        let outcome = loader.load_date_range(at(2016, 1, 1, 0), at(2016, 1, 1, 3)).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.records.columns(), &loader.columns()[..]);
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(outcome.unresolved[0].reason, UnresolvedReason::Missing);
    }

    #[test]
    fn ddr3_is_not_in_pds_files() {
        let loader = L2Loader::new(FilenameBuilder::pds(Level::L2, "https://example.invalid/PDS"));
        assert!(matches!(
            loader.load(&[], Ddr::Ddr3, None),
            Err(McsError::Config(_))
        ));
    }

    #[test]
    fn malformed_profile_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let loader = L2Loader::new(FilenameBuilder::directory(Level::L2, dir.path(), "level_2_2d"));
        let ids: BTreeSet<String> = ["nonsense".to_string()].into_iter().collect();
        assert!(matches!(
            loader.load_profiles(Ddr::Ddr2, &ids),
            Err(McsError::InvalidStamp(_))
        ));
    }
}
