//! Where MCS files live: file stamps, local archive paths and PDS URLs.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

use crate::config::Config;
use crate::data::schema::Level;
use crate::error::{McsError, Result};
use crate::time::{floor_to_hours, FILE_HOURS};

/// Stamp format used in file names of the local archive.
pub const GDS_DATE_FMT: &str = "%y%m%d%H%M%S";

/// Stamp format used in PDS file names.
pub const PDS_DATE_FMT: &str = "%Y%m%d%H";

pub const DEFAULT_PDS_URL_BASE: &str = "https://atmos.nmsu.edu/PDS/data";

/// Files known to be corrupt in the archive; loaders skip them.
pub const IGNORED_FILES: [&str; 1] = ["150826040000.L1B"];

// ---------------------------------------------------------------------------
// FileStamp – start of a 4-hour file window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileStamp(NaiveDateTime);

impl FileStamp {
    /// The window that contains `datetime`.
    pub fn containing(datetime: NaiveDateTime) -> Self {
        FileStamp(floor_to_hours(datetime, FILE_HOURS))
    }

    /// Parse `YYMMDDHH`, `YYMMDDHHMM` or `YYMMDDHHMMSS` and floor to its window.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(McsError::InvalidStamp(s.to_string()));
        }
        let padded = match s.len() {
            8 => format!("{s}0000"),
            10 => format!("{s}00"),
            12 => s.to_string(),
            _ => return Err(McsError::InvalidStamp(s.to_string())),
        };
        NaiveDateTime::parse_from_str(&padded, GDS_DATE_FMT)
            .map(Self::containing)
            .map_err(|_| McsError::InvalidStamp(s.to_string()))
    }

    /// Parse the `YYYYMMDDHH` stamp at the start of a PDS file name.
    pub fn from_pds_name(name: &str) -> Result<Self> {
        let stem = name.split('_').next().unwrap_or("");
        NaiveDateTime::parse_from_str(&format!("{stem}0000"), "%Y%m%d%H%M%S")
            .map(Self::containing)
            .map_err(|_| McsError::InvalidStamp(name.to_string()))
    }

    /// Recover the stamp from a local or remote file reference.
    pub fn from_source(source: &SourceRef) -> Result<Self> {
        let name = source.file_name();
        let stem = name.split('.').next().unwrap_or("");
        match source {
            SourceRef::Local(_) => Self::parse(stem),
            SourceRef::Remote(_) => Self::from_pds_name(stem),
        }
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// First instant after the window.
    pub fn window_end(&self) -> NaiveDateTime {
        self.0 + Duration::hours(FILE_HOURS as i64)
    }

    pub fn next(&self) -> Self {
        FileStamp(self.window_end())
    }

    pub fn prev(&self) -> Self {
        FileStamp(self.0 - Duration::hours(FILE_HOURS as i64))
    }

    /// 12-digit stamp, e.g. `160101040000`.
    pub fn gds(&self) -> String {
        self.0.format(GDS_DATE_FMT).to_string()
    }

    /// 10-digit stamp, e.g. `2016010104`.
    pub fn pds(&self) -> String {
        self.0.format(PDS_DATE_FMT).to_string()
    }

    /// Windows intersecting `start ..= end`, in time order.
    pub fn range(start: NaiveDateTime, end: NaiveDateTime) -> Vec<FileStamp> {
        let first = FileStamp::containing(start);
        // The end is floored and then always pushed one window further, so a
        // range ending exactly on a boundary includes the file starting there.
        let stop = FileStamp::containing(end).window_end();
        let mut stamps = Vec::new();
        let mut current = first;
        while current.0 < stop {
            stamps.push(current);
            current = current.next();
        }
        stamps
    }
}

impl fmt::Display for FileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.gds())
    }
}

// ---------------------------------------------------------------------------
// SourceRef – one file, local or remote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    Local(PathBuf),
    Remote(String),
}

impl SourceRef {
    /// Interpret a user-supplied string: URLs stay remote, everything else is a path.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            SourceRef::Remote(s.to_string())
        } else {
            SourceRef::Local(PathBuf::from(s))
        }
    }

    /// Base name of the file.
    pub fn file_name(&self) -> String {
        match self {
            SourceRef::Local(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            SourceRef::Remote(url) => url.rsplit('/').next().unwrap_or("").to_string(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceRef::Remote(_))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Local(p) => write!(f, "{}", p.display()),
            SourceRef::Remote(url) => f.write_str(url),
        }
    }
}

impl From<&Path> for SourceRef {
    fn from(p: &Path) -> Self {
        SourceRef::Local(p.to_path_buf())
    }
}

// ---------------------------------------------------------------------------
// FilenameBuilder – stamp → file reference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Archive {
    Pds { url_base: String },
    Directory { level_dir: PathBuf },
}

/// Builds file references for one product level in one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameBuilder {
    level: Level,
    archive: Archive,
}

impl FilenameBuilder {
    /// Files served by the PDS atmospheres node.
    pub fn pds(level: Level, url_base: &str) -> Self {
        log::info!("Setup to load {level} files from PDS ({url_base})");
        FilenameBuilder {
            level,
            archive: Archive::Pds {
                url_base: url_base.trim_end_matches('/').to_string(),
            },
        }
    }

    /// Files under `<root>/<subdir>/<YYMM>/`.
    pub fn directory(level: Level, root: &Path, subdir: &str) -> Self {
        let level_dir = root.join(subdir);
        log::info!("Setup to load {level} files from {}", level_dir.display());
        FilenameBuilder {
            level,
            archive: Archive::Directory { level_dir },
        }
    }

    pub fn from_config(level: Level, config: &Config) -> Result<Self> {
        if config.pds {
            return Ok(Self::pds(level, &config.pds_url_base));
        }
        let root = config.data_dir.as_deref().ok_or_else(|| {
            McsError::Config(
                "base directory for MCS data not provided as argument or environment variable"
                    .to_string(),
            )
        })?;
        Ok(Self::directory(level, root, config.subdir(level)))
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_pds(&self) -> bool {
        matches!(self.archive, Archive::Pds { .. })
    }

    pub fn source_for(&self, stamp: FileStamp) -> SourceRef {
        match &self.archive {
            Archive::Pds { url_base } => SourceRef::Remote(self.pds_url(url_base, stamp)),
            Archive::Directory { level_dir } => {
                let gds = stamp.gds();
                SourceRef::Local(
                    level_dir
                        .join(&gds[0..4])
                        .join(format!("{gds}.{}", self.level.file_suffix())),
                )
            }
        }
    }

    pub fn source_from_filestr(&self, filestr: &str) -> Result<(FileStamp, SourceRef)> {
        let stamp = FileStamp::parse(filestr)?;
        Ok((stamp, self.source_for(stamp)))
    }

    /// Every file whose window intersects `start ..= end`.
    pub fn sources_for_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<(FileStamp, SourceRef)>> {
        if start > end {
            return Err(McsError::InvalidRange { start, end });
        }
        Ok(FileStamp::range(start, end)
            .into_iter()
            .map(|s| (s, self.source_for(s)))
            .collect())
    }

    fn pds_url(&self, url_base: &str, stamp: FileStamp) -> String {
        let d = stamp.datetime();
        let (y, m, day, h) = (d.year(), d.month(), d.day(), d.hour());
        format!(
            "{url_base}/{volume}/DATA/{y:04}/{y:04}{m:02}/{y:04}{m:02}{day:02}/{y:04}{m:02}{day:02}{h:02}_{record}.TAB",
            volume = pds_volume(self.level, d),
            record = self.level.pds_record(),
        )
    }
}

/// PDS volume name: `MROM_<level digit><month count>`, where September 2006
/// is month 001.
pub fn pds_volume(level: Level, date: NaiveDateTime) -> String {
    let year = date.year();
    let month = date.month() as i32;
    let count = if month >= 9 {
        (year - 2006) * 12 + month - 8
    } else {
        (year - 2007) * 12 + 4 + month
    };
    format!("MROM_{}{count:03}", level.pds_volume_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn stamp_parsing_accepts_short_forms() {
        let s = FileStamp::parse("1601010000").unwrap();
        assert_eq!(s.gds(), "160101000000");
        assert_eq!(FileStamp::parse("16010105").unwrap().gds(), "160101040000");
        assert_eq!(FileStamp::parse("160101075959").unwrap().gds(), "160101040000");
        assert!(FileStamp::parse("16010").is_err());
        assert!(FileStamp::parse("16a101000000").is_err());
    }

    #[test]
    fn pds_stamp_round_trips() {
        let s = FileStamp::from_pds_name("2012080116_DDR").unwrap();
        assert_eq!(s.gds(), "120801160000");
        assert_eq!(s.pds(), "2012080116");
    }

    #[test]
    fn range_rounds_start_down_and_end_up() {
        let stamps = FileStamp::range(at(2016, 1, 1, 1, 30), at(2016, 1, 1, 9, 0));
        let names: Vec<String> = stamps.iter().map(|s| s.gds()).collect();
        assert_eq!(names, ["160101000000", "160101040000", "160101080000"]);
    }

    #[test]
    fn range_ending_on_boundary_includes_that_file() {
        let stamps = FileStamp::range(at(2016, 1, 1, 0, 0), at(2016, 1, 1, 4, 0));
        assert_eq!(stamps.len(), 2);
    }

    #[test]
    fn l1b_pds_filename() {
        let b = FilenameBuilder::pds(Level::L1B, DEFAULT_PDS_URL_BASE);
        let (_, src) = b.source_from_filestr("120801160000").unwrap();
        assert_eq!(
            src.to_string(),
            "https://atmos.nmsu.edu/PDS/data/MROM_1072/DATA/2012/201208/20120801/2012080116_RDR.TAB"
        );
    }

    #[test]
    fn l2_pds_filename() {
        let b = FilenameBuilder::pds(Level::L2, DEFAULT_PDS_URL_BASE);
        let (_, src) = b.source_from_filestr("120801160000").unwrap();
        let url = src.to_string();
        assert!(url.contains("MROM_2072"));
        assert!(url.ends_with("2012080116_DDR.TAB"));
    }

    #[test]
    fn directory_filenames() {
        let b = FilenameBuilder::directory(Level::L1B, Path::new("testdir"), "level_1b");
        let (_, src) = b.source_from_filestr("120801160000").unwrap();
        assert_eq!(
            src,
            SourceRef::Local(PathBuf::from("testdir/level_1b/1208/120801160000.L1B"))
        );

        let b = FilenameBuilder::directory(Level::L2, Path::new("testdir"), "level_2_2d");
        let (_, src) = b.source_from_filestr("120801160000").unwrap();
        assert_eq!(
            src,
            SourceRef::Local(PathBuf::from("testdir/level_2_2d/1208/120801160000.L2"))
        );
    }

    #[test]
    fn mrom_counts_from_september_2006() {
        assert_eq!(pds_volume(Level::L2, at(2006, 9, 30, 0, 0)), "MROM_2001");
        assert_eq!(pds_volume(Level::L2, at(2007, 1, 1, 0, 0)), "MROM_2005");
    }

    #[test]
    fn reversed_range_is_rejected() {
        let b = FilenameBuilder::pds(Level::L2, DEFAULT_PDS_URL_BASE);
        let err = b
            .sources_for_range(at(2016, 1, 2, 0, 0), at(2016, 1, 1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, McsError::InvalidRange { .. }));
    }

    #[test]
    fn stamp_from_source() {
        let local = SourceRef::parse("/data/level_2_2d/1601/160101040000.L2");
        assert_eq!(FileStamp::from_source(&local).unwrap().gds(), "160101040000");
        let remote = SourceRef::parse(
            "https://atmos.nmsu.edu/PDS/data/MROM_2113/DATA/2016/201601/20160101/2016010104_DDR.TAB",
        );
        assert_eq!(FileStamp::from_source(&remote).unwrap().gds(), "160101040000");
    }
}
