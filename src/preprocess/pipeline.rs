//! Record-set transforms shared by the L1B preprocessors.
//!
//! Every step takes a record set and returns a new one; an empty input gives
//! an empty output that still carries the step's added columns.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::fmt;

use chrono::{DateTime, NaiveDateTime};

pub use crate::data::filter::{select_range, select_time_range, select_values};
use crate::data::model::{RecordSet, Row, Value};
use crate::data::reader::DT_COLUMN;
use crate::data::schema::{detectors_by_altitude, rad_column_name, CHANNELS};
use crate::error::{McsError, Result};
use crate::geom::{position_from_lat_lon, scene_scattering_angle};
use crate::time::{ltst, parse_date_utc};

pub const FIRST_LIMB_COLUMN: &str = "first_limb";
pub const FIRST_THREE_LIMB_COLUMN: &str = "first_three_limb";
pub const SEQUENCE_COLUMN: &str = "sequence_label";
pub const DIRECTION_COLUMN: &str = "direction";
pub const LTST_COLUMN: &str = "LTST";
pub const SCATTERING_ANGLE_COLUMN: &str = "Scattering_angle";

/// Default gap, in seconds, that separates two limb sequences.
pub const FIRST_LIMB_SEC_BETWEEN: f64 = 5.0;

fn flag(b: bool) -> Value {
    Value::Int(b as i64)
}

fn is_set(v: &Value) -> bool {
    matches!(v, Value::Int(i) if *i != 0)
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Add `dt` from the `Date` and `UTC` columns (no-op when already present).
pub fn add_datetime_column(records: &RecordSet) -> Result<RecordSet> {
    if records.has_column(DT_COLUMN) {
        return Ok(records.clone());
    }
    let date = records.require_column("Date")?;
    let utc = records.require_column("UTC")?;
    let mut out = records.clone();
    out.add_derived_column(DT_COLUMN, |row| {
        match (row[date].as_str(), row[utc].as_str()) {
            (Some(d), Some(u)) => parse_date_utc(d, u).map_or(Value::Null, Value::DateTime),
            _ => Value::Null,
        }
    })?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Limb sequences
// ---------------------------------------------------------------------------

/// Flag the first view of each limb sequence and the first three views.
///
/// A view starts a sequence when more than `min_sec_between` seconds passed
/// since the previous view; the first row always starts one. Expects rows
/// already reduced to limb views, in time order.
pub fn add_first_limb_columns(records: &RecordSet, min_sec_between: f64) -> Result<RecordSet> {
    let dt = records.require_column(DT_COLUMN)?;
    let max_gap_ms = (min_sec_between * 1000.0) as i64;

    let mut first: Vec<bool> = Vec::with_capacity(records.len());
    let mut prev: Option<NaiveDateTime> = None;
    for row in records.rows() {
        let now = row[dt].as_datetime();
        let starts = match (prev, now) {
            (None, _) => true,
            (Some(p), Some(n)) => (n - p).num_milliseconds() > max_gap_ms,
            (Some(_), None) => false,
        };
        first.push(starts);
        if now.is_some() {
            prev = now;
        }
    }
    let first_three: Vec<bool> = (0..first.len())
        .map(|i| (0..3).any(|back| i >= back && first[i - back]))
        .collect();

    let mut out = records.clone();
    out.add_column(FIRST_LIMB_COLUMN, first.into_iter().map(flag).collect())?;
    out.add_column(
        FIRST_THREE_LIMB_COLUMN,
        first_three.into_iter().map(flag).collect(),
    )?;
    Ok(out)
}

/// Number sequences from 1, starting a new one at every first-limb row.
pub fn add_sequence_column(records: &RecordSet) -> Result<RecordSet> {
    let first = records.require_column(FIRST_LIMB_COLUMN)?;
    let mut counter = 0;
    let mut out = records.clone();
    out.add_derived_column(SEQUENCE_COLUMN, |row| {
        if is_set(&row[first]) {
            counter += 1;
        }
        Value::Int(counter)
    })?;
    Ok(out)
}

/// Drop the first three views of each sequence (thermal drift).
pub fn remove_first_three_limb(records: &RecordSet) -> Result<RecordSet> {
    let idx = records.require_column(FIRST_THREE_LIMB_COLUMN)?;
    Ok(records.filter(|row| !is_set(&row[idx])))
}

// ---------------------------------------------------------------------------
// Viewing direction
// ---------------------------------------------------------------------------

/// Azimuth-commanded viewing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    In,
    Left,
    Right,
    Aft,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::In, Direction::Left, Direction::Right, Direction::Aft];

    /// `[lo, hi)` azimuth bin, degrees.
    pub fn azimuth_range(self) -> (f64, f64) {
        match self {
            Direction::In => (170.0, 190.0),
            Direction::Left => (80.0, 100.0),
            Direction::Right => (260.0, 280.0),
            Direction::Aft => (0.0, 3.0),
        }
    }

    pub fn from_azimuth(az: f64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| {
            let (lo, hi) = d.azimuth_range();
            az >= lo && az < hi
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Aft => "aft",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label every row with its direction (null outside all bins).
pub fn add_direction_column(records: &RecordSet) -> Result<RecordSet> {
    let az = records.require_column("Last_az_cmd")?;
    let mut out = records.clone();
    out.add_derived_column(DIRECTION_COLUMN, |row| {
        row[az]
            .as_f64()
            .and_then(Direction::from_azimuth)
            .map_or(Value::Null, |d| Value::Text(d.label().to_string()))
    })?;
    Ok(out)
}

/// Keep rows looking in one of `directions`. Needs [`add_direction_column`].
pub fn select_direction(records: &RecordSet, directions: &[Direction]) -> Result<RecordSet> {
    if !records.has_column(DIRECTION_COLUMN) {
        return Err(McsError::MissingColumn(DIRECTION_COLUMN.to_string()));
    }
    let values: BTreeSet<Value> = directions
        .iter()
        .map(|d| Value::Text(d.label().to_string()))
        .collect();
    select_values(records, DIRECTION_COLUMN, &values)
}

// ---------------------------------------------------------------------------
// Derived geometry
// ---------------------------------------------------------------------------

/// Local true solar time of the scene from `Scene_lon` and `Solar_lon`.
pub fn add_ltst_column(records: &RecordSet) -> Result<RecordSet> {
    let lon = records.require_column("Scene_lon")?;
    let sun = records.require_column("Solar_lon")?;
    let mut out = records.clone();
    out.add_derived_column(LTST_COLUMN, |row| {
        match (row[lon].as_f64(), row[sun].as_f64()) {
            (Some(l), Some(s)) => Value::Float(ltst(l, s)),
            _ => Value::Null,
        }
    })?;
    Ok(out)
}

/// Angle at the scene between the sun and the spacecraft
/// (0 = forward scattering, 180 = back scattering).
pub fn add_scattering_angle_column(records: &RecordSet) -> Result<RecordSet> {
    let names = [
        "Solar_dist", "Solar_lat", "Solar_lon", "Scene_rad", "Scene_lat", "Scene_lon", "SC_rad",
        "SC_lat", "SC_lon",
    ];
    let idx: Vec<usize> = names
        .iter()
        .map(|n| records.require_column(n))
        .collect::<Result<_>>()?;
    let mut out = records.clone();
    out.add_derived_column(SCATTERING_ANGLE_COLUMN, |row| {
        let v: Option<Vec<f64>> = idx.iter().map(|&i| row[i].as_f64()).collect();
        match v.as_deref() {
            Some(&[sd, sla, slo, rr, rla, rlo, cr, cla, clo]) => {
                let sun = position_from_lat_lon(sd, sla, slo);
                let scene = position_from_lat_lon(rr, rla, rlo);
                let sc = position_from_lat_lon(cr, cla, clo);
                Value::Float(scene_scattering_angle(sun, scene, sc))
            }
            _ => Value::Null,
        }
    })?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Sequence averages
// ---------------------------------------------------------------------------

/// Columns averaged on a circle, with their period.
const CYCLIC_COLUMNS: [(&str, f64, f64); 8] = [
    ("L_sub_s", 0.0, 360.0),
    ("LTST", 0.0, 24.0),
    ("Solar_lon", -180.0, 180.0),
    ("SC_lon", -180.0, 180.0),
    ("Scene_lon", -180.0, 180.0),
    ("Vert_lon", -180.0, 180.0),
    ("Last_az_cmd", 0.0, 360.0),
    ("Limb_ang", -180.0, 180.0),
];

const STANDARD_MEAN_COLUMNS: [&str; 15] = [
    "dt",
    "SCLK",
    "Solar_dist",
    "Solar_lat",
    "SC_rad",
    "SC_lat",
    "Scene_rad",
    "Scene_lat",
    "Scene_alt",
    "Solar_zen",
    "Vert_lat",
    "Radiance",
    "Last_el_cmd",
    "Scattering_angle",
    "+5V",
];

#[derive(Debug, Clone, Copy)]
enum Mean {
    Linear,
    Circular(f64, f64),
    Time,
}

fn mean_kind(column: &str) -> Option<Mean> {
    if let Some(&(_, lo, hi)) = CYCLIC_COLUMNS.iter().find(|(c, _, _)| *c == column) {
        return Some(Mean::Circular(lo, hi));
    }
    if column == DT_COLUMN {
        return Some(Mean::Time);
    }
    if column.starts_with("Rad_")
        || column.contains("temp")
        || column.contains("5V")
        || STANDARD_MEAN_COLUMNS.contains(&column)
    {
        return Some(Mean::Linear);
    }
    None
}

/// Circular mean of angles in `[low, high)`, returned in the same range.
pub fn circular_mean(values: &[f64], low: f64, high: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let period = high - low;
    let (s, c) = values.iter().fold((0.0, 0.0), |(s, c), v| {
        let a = (v - low) * 2.0 * PI / period;
        (s + a.sin(), c + a.cos())
    });
    let angle = s.atan2(c).rem_euclid(2.0 * PI);
    let mean = low + angle * period / (2.0 * PI);
    // rem_euclid can land exactly on 2π through rounding.
    Some(if mean >= high { low } else { mean })
}

fn mean_of(cells: &[&Value], kind: Mean) -> Value {
    match kind {
        Mean::Time => {
            let ms: Vec<i64> = cells
                .iter()
                .filter_map(|v| v.as_datetime())
                .map(|d| d.and_utc().timestamp_millis())
                .collect();
            if ms.is_empty() {
                return Value::Null;
            }
            let mean = ms.iter().map(|&m| m as i128).sum::<i128>() / ms.len() as i128;
            DateTime::from_timestamp_millis(mean as i64)
                .map_or(Value::Null, |d| Value::DateTime(d.naive_utc()))
        }
        Mean::Linear => {
            let v: Vec<f64> = cells.iter().filter_map(|v| v.as_f64()).collect();
            if v.is_empty() {
                Value::Null
            } else {
                Value::Float(v.iter().sum::<f64>() / v.len() as f64)
            }
        }
        Mean::Circular(lo, hi) => {
            let v: Vec<f64> = cells.iter().filter_map(|v| v.as_f64()).collect();
            circular_mean(&v, lo, hi).map_or(Value::Null, Value::Float)
        }
    }
}

/// One averaged row per sequence, in sequence order.
///
/// Only geometry, radiance, temperature and time columns are averaged;
/// flag and index columns do not survive.
pub fn average_limb_sequences(records: &RecordSet) -> Result<RecordSet> {
    let seq = records.require_column(SEQUENCE_COLUMN)?;
    let kept: Vec<(usize, String, Mean)> = records
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| mean_kind(c).map(|k| (i, c.clone(), k)))
        .collect();

    // Group row indices by sequence label, preserving first-seen order.
    let mut index: BTreeMap<&Value, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, row) in records.rows().iter().enumerate() {
        let group = *index.entry(&row[seq]).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(i);
    }

    let rows: Vec<Row> = groups
        .iter()
        .map(|members| {
            kept.iter()
                .map(|(col, _, kind)| {
                    let cells: Vec<&Value> = members.iter().map(|&m| &records.rows()[m][*col]).collect();
                    mean_of(&cells, *kind)
                })
                .collect()
        })
        .collect();

    RecordSet::from_rows(kept.into_iter().map(|(_, c, _)| c).collect(), rows)
}

// ---------------------------------------------------------------------------
// Radiance grid
// ---------------------------------------------------------------------------

/// Radiances of one channel as a time × detector grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceGrid {
    pub channel: String,
    pub times: Vec<NaiveDateTime>,
    /// Detector numbers, ordered by increasing altitude.
    pub detectors: Vec<u8>,
    /// `values[t][d]` for `times[t]`, `detectors[d]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl RadianceGrid {
    /// Smallest and largest finite radiance in the grid.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .flatten()
            .flatten()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Melt the `Rad_<channel>_<det>` columns into a grid. Rows without a time
/// are skipped.
pub fn radiance_grid(records: &RecordSet, channel: &str) -> Result<RadianceGrid> {
    if !CHANNELS.contains(&channel) {
        return Err(McsError::Config(format!("unknown channel {channel}")));
    }
    let dt = records.require_column(DT_COLUMN)?;
    let detectors = detectors_by_altitude(channel);
    let cols: Vec<usize> = detectors
        .iter()
        .map(|&d| records.require_column(&rad_column_name(channel, d)))
        .collect::<Result<_>>()?;

    let mut times = Vec::new();
    let mut values = Vec::new();
    for row in records.rows() {
        if let Some(t) = row[dt].as_datetime() {
            times.push(t);
            values.push(cols.iter().map(|&c| row[c].as_f64()).collect());
        }
    }
    Ok(RadianceGrid {
        channel: channel.to_string(),
        times,
        detectors,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    /// Rows at the given second offsets with a matching `x` column.
    fn timed(offsets: &[i64]) -> RecordSet {
        let rows = offsets
            .iter()
            .map(|&s| {
                vec![
                    Value::DateTime(t0() + Duration::seconds(s)),
                    Value::Float(s as f64),
                ]
            })
            .collect();
        RecordSet::from_rows(vec!["dt".into(), "x".into()], rows).unwrap()
    }

    fn ints(rs: &RecordSet, col: &str) -> Vec<i64> {
        rs.column(col)
            .unwrap()
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn sequences_split_on_gaps() {
        let rs = timed(&[0, 2, 4, 6, 8, 60, 62, 64, 66]);
        let rs = add_first_limb_columns(&rs, FIRST_LIMB_SEC_BETWEEN).unwrap();
        assert_eq!(ints(&rs, FIRST_LIMB_COLUMN), [1, 0, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(ints(&rs, FIRST_THREE_LIMB_COLUMN), [1, 1, 1, 0, 0, 1, 1, 1, 0]);

        let rs = add_sequence_column(&rs).unwrap();
        assert_eq!(ints(&rs, SEQUENCE_COLUMN), [1, 1, 1, 1, 1, 2, 2, 2, 2]);

        let rs = remove_first_three_limb(&rs).unwrap();
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn empty_input_keeps_added_columns() {
        let rs = timed(&[]);
        let rs = add_first_limb_columns(&rs, 5.0).unwrap();
        let rs = add_sequence_column(&rs).unwrap();
        assert!(rs.is_empty());
        assert!(rs.has_column(SEQUENCE_COLUMN));
    }

    #[test]
    fn directions_bin_azimuth() {
        assert_eq!(Direction::from_azimuth(180.0), Some(Direction::In));
        assert_eq!(Direction::from_azimuth(190.0), None);
        assert_eq!(Direction::from_azimuth(170.0), Some(Direction::In));
        assert_eq!(Direction::from_azimuth(90.0), Some(Direction::Left));
        assert_eq!(Direction::from_azimuth(270.0), Some(Direction::Right));
        assert_eq!(Direction::from_azimuth(1.0), Some(Direction::Aft));
    }

    #[test]
    fn select_direction_requires_labels() {
        let rs = timed(&[0]);
        assert!(matches!(
            select_direction(&rs, &[Direction::In]),
            Err(McsError::MissingColumn(_))
        ));
    }

    #[test]
    fn circular_mean_wraps() {
        let m = circular_mean(&[350.0, 10.0], 0.0, 360.0).unwrap();
        assert!(m < 1e-9 || (360.0 - m) < 1e-9);
        let m = circular_mean(&[179.0, -179.0], -180.0, 180.0).unwrap();
        assert!((m.abs() - 180.0).abs() < 1e-9);
        let m = circular_mean(&[23.0, 1.0], 0.0, 24.0).unwrap();
        assert!(m < 1e-9 || (24.0 - m) < 1e-9);
        assert_eq!(circular_mean(&[], 0.0, 1.0), None);
    }

    #[test]
    fn averages_per_sequence() {
        let cols = ["dt", "Scene_lon", "Scene_alt", "Gqual", SEQUENCE_COLUMN];
        let row = |s: i64, lon: f64, alt: f64, seq: i64| {
            vec![
                Value::DateTime(t0() + Duration::seconds(s)),
                Value::Float(lon),
                Value::Float(alt),
                Value::Int(0),
                Value::Int(seq),
            ]
        };
        let rs = RecordSet::from_rows(
            cols.iter().map(|c| c.to_string()).collect(),
            vec![
                row(0, 179.0, 30.0, 1),
                row(2, -179.0, 40.0, 1),
                row(60, 10.0, 50.0, 2),
            ],
        )
        .unwrap();

        let ave = average_limb_sequences(&rs).unwrap();
        assert_eq!(ave.columns(), &["dt", "Scene_lon", "Scene_alt"].map(String::from)[..]);
        assert_eq!(ave.len(), 2);
        assert_eq!(ave.get(0, "dt"), Some(&Value::DateTime(t0() + Duration::seconds(1))));
        assert_eq!(ave.get(0, "Scene_alt"), Some(&Value::Float(35.0)));
        let lon = ave.get(0, "Scene_lon").and_then(Value::as_f64).unwrap();
        assert!((lon.abs() - 180.0).abs() < 1e-6);
        assert_eq!(ave.get(1, "Scene_alt"), Some(&Value::Float(50.0)));
    }

    #[test]
    fn interleaved_labels_share_a_group() {
        let rs = RecordSet::from_rows(
            vec!["Scene_alt".into(), SEQUENCE_COLUMN.into()],
            vec![
                vec![Value::Float(10.0), Value::Int(2)],
                vec![Value::Float(30.0), Value::Int(1)],
                vec![Value::Float(20.0), Value::Int(2)],
            ],
        )
        .unwrap();
        let ave = average_limb_sequences(&rs).unwrap();
        assert_eq!(ave.len(), 2);
        assert_eq!(ave.get(0, "Scene_alt"), Some(&Value::Float(15.0)));
        assert_eq!(ave.get(1, "Scene_alt"), Some(&Value::Float(30.0)));
    }

    #[test]
    fn ltst_column() {
        let rs = RecordSet::from_rows(
            vec!["Scene_lon".into(), "Solar_lon".into()],
            vec![vec![Value::Float(45.0), Value::Float(45.0)], vec![Value::Null, Value::Float(0.0)]],
        )
        .unwrap();
        let rs = add_ltst_column(&rs).unwrap();
        assert_eq!(rs.get(0, LTST_COLUMN), Some(&Value::Float(12.0)));
        assert_eq!(rs.get(1, LTST_COLUMN), Some(&Value::Null));
    }

    #[test]
    fn grid_orders_detectors_by_altitude() {
        let mut cols = vec!["dt".to_string()];
        let mut row = vec![Value::DateTime(t0())];
        for d in 1..=21u8 {
            cols.push(rad_column_name("A1", d));
            row.push(Value::Float(d as f64));
        }
        let rs = RecordSet::from_rows(cols, vec![row]).unwrap();
        let grid = radiance_grid(&rs, "A1").unwrap();
        assert_eq!(grid.detectors[0], 21);
        assert_eq!(grid.values[0][0], Some(21.0));
        assert_eq!(grid.value_range(), Some((1.0, 21.0)));
        assert!(radiance_grid(&rs, "C9").is_err());
    }
}
