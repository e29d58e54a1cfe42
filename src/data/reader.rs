use std::io::{ErrorKind, Read};

use csv::{ReaderBuilder, Trim};

use super::model::{RecordSet, Row, Value};
use super::schema::{
    l1b_column_kind, l1b_columns, ColumnKind, Ddr, L2Layout, Level, COMMENT_CHAR,
    L1B_HEADER_COLUMNS, LEVEL_COLUMN, NAN_VALUES, PROFILE_ID_COLUMN,
};
use super::source::{FileStamp, SourceRef};
use crate::error::{McsError, Result};
use crate::time::{mars_year, parse_date_utc};

/// Derived date-time column built from `Date` + `UTC`.
pub const DT_COLUMN: &str = "dt";

/// Derived Mars Year column.
pub const MY_COLUMN: &str = "MY";

/// Sentinel for missing numeric data.
const MISSING: f64 = -9999.0;

/// Number of leading lines searched for L1B header values.
const HEADER_SEARCH_LINES: usize = 40;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Format tag of a file: which product and, for L2, which data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    L1B,
    L2(Ddr),
}

impl Product {
    pub fn level(self) -> Level {
        match self {
            Product::L1B => Level::L1B,
            Product::L2(_) => Level::L2,
        }
    }

    /// Guess the level from a file name (`.L1B`, `_RDR.TAB`, `.L2`, `_DDR.TAB`).
    pub fn level_from_name(name: &str) -> Option<Level> {
        let upper = name.to_ascii_uppercase();
        if upper.ends_with(".L1B") || upper.ends_with("_RDR.TAB") {
            Some(Level::L1B)
        } else if upper.ends_with(".L2") || upper.ends_with("_DDR.TAB") {
            Some(Level::L2)
        } else {
            None
        }
    }
}

/// Optional derived columns appended after the file's own columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Add `dt`, parsed from `Date` and `UTC`.
    pub datetime: bool,
    /// Add `MY`, the Mars Year of `dt` (implies `datetime`).
    pub mars_year: bool,
}

impl ReadOptions {
    pub fn with_datetime() -> Self {
        ReadOptions {
            datetime: true,
            mars_year: false,
        }
    }

    fn wants_datetime(&self) -> bool {
        self.datetime || self.mars_year
    }

    fn extra_columns(&self) -> Vec<String> {
        let mut cols = Vec::new();
        if self.wants_datetime() {
            cols.push(DT_COLUMN.to_string());
        }
        if self.mars_year {
            cols.push(MY_COLUMN.to_string());
        }
        cols
    }

    fn extra_values(&self, dt: Option<chrono::NaiveDateTime>) -> Vec<Value> {
        let mut values = Vec::new();
        if self.wants_datetime() {
            values.push(dt.map_or(Value::Null, Value::DateTime));
        }
        if self.mars_year {
            values.push(dt.map_or(Value::Null, |d| Value::Int(mars_year(d))));
        }
        values
    }
}

/// Read one file of a known product.
///
/// PDS archives only ship DDR1/DDR2 in their L2 files, so remote L2 sources
/// are parsed with the PDS layout.
pub fn read_file(source: &SourceRef, product: Product, options: ReadOptions) -> Result<RecordSet> {
    match product {
        Product::L1B => L1BReader::new(options).read(source),
        Product::L2(ddr) => {
            let layout = if source.is_remote() {
                L2Layout::Pds
            } else {
                L2Layout::Full
            };
            L2Reader::new(layout, options).read(source, ddr)
        }
    }
}

/// Fetch the full text of a local file or URL.
pub fn fetch_text(source: &SourceRef) -> Result<String> {
    match source {
        SourceRef::Local(path) => match std::fs::read_to_string(path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(McsError::NotFound(source.clone())),
            Err(e) => Err(e.into()),
        },
        SourceRef::Remote(url) => fetch_url(url, source),
    }
}

fn fetch_url(url: &str, source: &SourceRef) -> Result<String> {
    log::debug!("GET {url}");
    match ureq::get(url).call() {
        Ok(response) => {
            let mut text = String::new();
            response.into_reader().read_to_string(&mut text)?;
            Ok(text)
        }
        Err(ureq::Error::Status(404, _)) => Err(McsError::NotFound(source.clone())),
        Err(ureq::Error::Status(code, _)) => Err(McsError::Http {
            url: url.to_string(),
            reason: format!("status {code}"),
        }),
        Err(e) => Err(McsError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

fn parse_cell(raw: &str, kind: ColumnKind) -> std::result::Result<Value, String> {
    let s = raw.trim().trim_matches('"').trim();
    if NAN_VALUES.contains(&s) {
        return Ok(Value::Null);
    }
    match kind {
        ColumnKind::Text => Ok(Value::Text(s.to_string())),
        ColumnKind::Int => parse_int(s)
            .map(int_value)
            .ok_or_else(|| format!("'{s}' is not an integer")),
        ColumnKind::Float => s
            .parse::<f64>()
            .map(float_value)
            .map_err(|_| format!("'{s}' is not a number")),
        ColumnKind::Auto => Ok(guess_value(s)),
    }
}

fn parse_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn int_value(i: i64) -> Value {
    if i as f64 == MISSING {
        Value::Null
    } else {
        Value::Int(i)
    }
}

fn float_value(f: f64) -> Value {
    if f == MISSING || f.is_nan() {
        Value::Null
    } else {
        Value::Float(f)
    }
}

fn guess_value(s: &str) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        return int_value(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return float_value(f);
    }
    Value::Text(s.to_string())
}

/// Split an L2 line on commas, dropping quotes and padding.
fn split_fields(line: &str) -> Vec<String> {
    line.trim_end()
        .split(',')
        .map(|x| x.replace('"', "").trim().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// L1B
// ---------------------------------------------------------------------------

/// Reads a *single* L1B file.
///
/// L1B files are CSV with `#` comment headers, one header row and 260
/// columns per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct L1BReader {
    options: ReadOptions,
}

/// Values scraped from the L1B comment header.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct L1BHeader {
    /// Sun–Mars distance in km.
    pub solar_dist: Option<f64>,
    /// Solar longitude in degrees.
    pub l_sub_s: Option<f64>,
}

impl L1BReader {
    pub fn new(options: ReadOptions) -> Self {
        Self { options }
    }

    /// Columns of every record set this reader returns.
    pub fn output_columns(&self) -> Vec<String> {
        let mut cols = l1b_columns();
        cols.extend(L1B_HEADER_COLUMNS.iter().map(|c| c.to_string()));
        cols.extend(self.options.extra_columns());
        cols
    }

    pub fn read(&self, source: &SourceRef) -> Result<RecordSet> {
        let text = fetch_text(source)?;
        self.parse(&text, source)
    }

    /// Parse the text of an L1B file. `source` only labels errors.
    pub fn parse(&self, text: &str, source: &SourceRef) -> Result<RecordSet> {
        let columns = l1b_columns();
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| l1b_column_kind(c)).collect();

        let mut reader = ReaderBuilder::new()
            .comment(Some(COMMENT_CHAR as u8))
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let n_header = reader
            .headers()
            .map_err(|e| McsError::format(source, format!("reading header row: {e}")))?
            .len();
        if n_header != columns.len() {
            return Err(McsError::format(
                source,
                format!(
                    "number of columns does not match expected: {} expected, header has {n_header}",
                    columns.len()
                ),
            ));
        }

        let mut rows: Vec<Row> = Vec::new();
        for (row_no, result) in reader.records().enumerate() {
            let record =
                result.map_err(|e| McsError::format(source, format!("row {row_no}: {e}")))?;
            let row = record
                .iter()
                .zip(&kinds)
                .zip(&columns)
                .map(|((raw, kind), col)| {
                    parse_cell(raw, *kind).map_err(|e| {
                        McsError::format(source, format!("row {row_no}, column {col}: {e}"))
                    })
                })
                .collect::<Result<Row>>()?;
            rows.push(row);
        }

        let header = parse_l1b_header(text);
        let date_idx = columns.iter().position(|c| c == "Date");
        let utc_idx = columns.iter().position(|c| c == "UTC");

        let mut out_rows = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.push(header.solar_dist.map_or(Value::Null, Value::Float));
            row.push(header.l_sub_s.map_or(Value::Null, Value::Float));
            let dt = match (date_idx, utc_idx) {
                (Some(d), Some(u)) if self.options.wants_datetime() => {
                    match (row[d].as_str(), row[u].as_str()) {
                        (Some(date), Some(utc)) => parse_date_utc(date, utc),
                        _ => None,
                    }
                }
                _ => None,
            };
            row.extend(self.options.extra_values(dt));
            out_rows.push(row);
        }

        log::debug!("Read {} L1B rows from {source}", out_rows.len());
        RecordSet::from_rows(self.output_columns(), out_rows)
    }
}

/// Pull `Solar_dist` and `L_sub_s` out of the leading comment lines.
pub fn parse_l1b_header(text: &str) -> L1BHeader {
    let mut header = L1BHeader::default();
    for line in text.lines().take(HEADER_SEARCH_LINES) {
        if !line.starts_with(COMMENT_CHAR) {
            break;
        }
        let value = line.trim().rsplit('=').next().unwrap_or("");
        if line.contains("Solar_dist") {
            header.solar_dist = value.split("(km)").next().and_then(|v| v.trim().parse().ok());
        } else if line.contains("L_sub_s") {
            header.l_sub_s = value.trim().parse().ok();
        }
        if header.solar_dist.is_some() && header.l_sub_s.is_some() {
            break;
        }
    }
    header
}

// ---------------------------------------------------------------------------
// L2
// ---------------------------------------------------------------------------

/// Reads one data record (DDR1–DDR4) out of a *single* L2 file.
///
/// Layout: `#` comments, one column-name line per record, then one block
/// per profile holding each record's lines in turn.
#[derive(Debug, Clone, Copy)]
pub struct L2Reader {
    layout: L2Layout,
    options: ReadOptions,
}

impl L2Reader {
    pub fn new(layout: L2Layout, options: ReadOptions) -> Self {
        Self { layout, options }
    }

    pub fn layout(&self) -> L2Layout {
        self.layout
    }

    /// Columns of every record set this reader returns for `ddr`.
    pub fn output_columns(&self, ddr: Ddr) -> Vec<String> {
        let mut cols: Vec<String> = ddr.columns().iter().map(|c| c.to_string()).collect();
        cols.push(PROFILE_ID_COLUMN.to_string());
        if ddr == Ddr::Ddr2 {
            cols.push(LEVEL_COLUMN.to_string());
        }
        cols.extend(self.options.extra_columns());
        cols
    }

    pub fn read(&self, source: &SourceRef, ddr: Ddr) -> Result<RecordSet> {
        let text = fetch_text(source)?;
        self.parse(&text, source, ddr)
    }

    /// Parse the text of an L2 file. `source` labels errors and names the
    /// profiles.
    pub fn parse(&self, text: &str, source: &SourceRef, ddr: Ddr) -> Result<RecordSet> {
        if !self.layout.contains(ddr) {
            return Err(McsError::format(
                source,
                format!("{ddr} is not part of {:?} L2 files", self.layout),
            ));
        }
        let lines: Vec<&str> = text.lines().collect();
        let n_comments = lines
            .iter()
            .take_while(|l| l.starts_with(COMMENT_CHAR))
            .count();

        let records = self.layout.records();
        for (i, record) in records.iter().enumerate() {
            let line = lines.get(n_comments + i).ok_or_else(|| {
                McsError::format(source, format!("missing {record} column-name line"))
            })?;
            let names = split_fields(line);
            if !names.iter().map(String::as_str).eq(record.columns().iter().copied()) {
                return Err(McsError::format(
                    source,
                    format!("{record} column names do not match expected, got {names:?}"),
                ));
            }
        }

        let body = &lines[n_comments + records.len()..];
        let body_len = body
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .map_or(0, |i| i + 1);
        let body = &body[..body_len];

        let per_profile = self.layout.lines_per_profile();
        if body.len() % per_profile != 0 {
            return Err(McsError::format(
                source,
                format!(
                    "{} data lines is not a whole number of {per_profile}-line profiles",
                    body.len()
                ),
            ));
        }

        let offset: usize = records
            .iter()
            .take_while(|r| **r != ddr)
            .map(|r| r.lines_per_profile())
            .sum();
        let columns = ddr.columns();
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| ddr.column_kind(c)).collect();
        let prefix = profile_prefix(source);

        let mut rows: Vec<Row> = Vec::new();
        for (profile, block) in body.chunks(per_profile).enumerate() {
            let profile_id = Value::Text(format!("{prefix}_{profile}"));
            let dt = if self.options.wants_datetime() {
                // Every record of a profile shares the DDR1 observation time.
                let ddr1 = split_fields(block[0]);
                match (ddr1.get(1), ddr1.get(2)) {
                    (Some(date), Some(utc)) => parse_date_utc(date, utc),
                    _ => None,
                }
            } else {
                None
            };

            let record_lines = &block[offset..offset + ddr.lines_per_profile()];
            for (level, line) in record_lines.iter().enumerate() {
                let fields = split_fields(line);
                if fields.len() != columns.len() {
                    return Err(McsError::format(
                        source,
                        format!(
                            "profile {profile}, {ddr} line {level}: expected {} fields, got {}",
                            columns.len(),
                            fields.len()
                        ),
                    ));
                }
                let mut row = fields
                    .iter()
                    .zip(&kinds)
                    .zip(columns)
                    .map(|((raw, kind), col)| {
                        parse_cell(raw, *kind).map_err(|e| {
                            McsError::format(
                                source,
                                format!("profile {profile}, {ddr} column {col}: {e}"),
                            )
                        })
                    })
                    .collect::<Result<Row>>()?;
                row.push(profile_id.clone());
                if ddr == Ddr::Ddr2 {
                    row.push(Value::Int(level as i64));
                }
                row.extend(self.options.extra_values(dt));
                rows.push(row);
            }
        }

        log::debug!("Read {} {ddr} rows from {source}", rows.len());
        RecordSet::from_rows(self.output_columns(ddr), rows)
    }
}

/// Profile identifiers start with the 12-digit stamp of their file, or the
/// bare file stem for files outside the archive naming scheme.
fn profile_prefix(source: &SourceRef) -> String {
    FileStamp::from_source(source)
        .map(|s| s.gds())
        .unwrap_or_else(|_| {
            let name = source.file_name();
            name.split('.').next().unwrap_or("").to_string()
        })
}

/// Split a profile identifier into its file stamp and profile number.
pub fn split_profile_id(id: &str) -> Option<(FileStamp, usize)> {
    let (stamp, n) = id.rsplit_once('_')?;
    Some((FileStamp::parse(stamp).ok()?, n.parse().ok()?))
}
