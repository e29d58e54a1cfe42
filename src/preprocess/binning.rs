//! Regular bins over DDR1 columns (latitude, longitude, season, local time)
//! and the profiles that fall in each.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::filter::{Condition, FilterConfig};
use crate::data::model::{RecordSet, Value};
use crate::data::schema::PROFILE_ID_COLUMN;
use crate::error::{McsError, Result};

/// Bins `start, start + step, …` up to and including the first edge at or
/// past `stop`. Written as `[start, stop, step]` in bin files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct BinSpec {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl From<[f64; 3]> for BinSpec {
    fn from([start, stop, step]: [f64; 3]) -> Self {
        Self { start, stop, step }
    }
}

impl From<BinSpec> for [f64; 3] {
    fn from(b: BinSpec) -> Self {
        [b.start, b.stop, b.step]
    }
}

impl BinSpec {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    fn validate(&self, column: &str) -> Result<()> {
        let finite = [self.start, self.stop, self.step].iter().all(|v| v.is_finite());
        if !finite || self.step <= 0.0 || self.stop <= self.start {
            return Err(McsError::Config(format!(
                "bins for {column}: need start < stop and step > 0, got {:?}",
                <[f64; 3]>::from(*self)
            )));
        }
        Ok(())
    }

    /// Bin edges.
    pub fn edges(&self) -> Vec<f64> {
        let n = ((self.stop + self.step - self.start) / self.step - 1e-9).ceil().max(1.0) as usize;
        (0..n).map(|i| self.start + i as f64 * self.step).collect()
    }

    /// Bin centres, one fewer than the edges.
    pub fn midpoints(&self) -> Vec<f64> {
        self.edges().windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }

    /// Index of the bin `(lo, hi]` holding `value`.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        let edges = self.edges();
        let (first, last) = (*edges.first()?, *edges.last()?);
        if !(value > first && value <= last) {
            return None;
        }
        Some(edges.partition_point(|&e| e < value) - 1)
    }

    /// Edges `[lo, lo + step)` of the bin a single location falls in.
    pub fn edges_around(&self, value: f64) -> Option<(f64, f64)> {
        let edges = self.edges();
        if value > *edges.last()? {
            return None;
        }
        let i = edges.partition_point(|&e| e <= value).checked_sub(1)?;
        let lo = edges[i];
        Some((lo, lo + self.step))
    }
}

/// Bins per column, read from JSON such as
/// `{ "Profile_lat": [-90, 90, 5], "Profile_lon": [-180, 180, 15] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinConfig(pub BTreeMap<String, BinSpec>);

/// Name of the column holding the bin centre of `column`.
pub fn mid_column_name(column: &str) -> String {
    format!("{column}_mid")
}

impl BinConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| McsError::Config(format!("bins: {e}")))?;
        for (column, spec) in &config.0 {
            spec.validate(column)?;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading bins from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Add a `<column>_mid` column per binned column holding the centre of
    /// the row's bin. Values outside every bin get null.
    pub fn bin_profiles(&self, records: &RecordSet) -> Result<RecordSet> {
        let mut out = records.clone();
        for (column, spec) in &self.0 {
            let idx = records.require_column(column)?;
            let mids = spec.midpoints();
            out.add_derived_column(&mid_column_name(column), |row| {
                row[idx]
                    .as_f64()
                    .and_then(|v| spec.bin_index(v))
                    .map_or(Value::Null, |i| Value::Float(mids[i]))
            })?;
            log::debug!("Binned {column} into {} bins", mids.len());
        }
        Ok(out)
    }

    /// Profile identifiers per occupied bin, keyed by bin centres in column
    /// order. Expects the output of [`BinConfig::bin_profiles`].
    pub fn profiles_by_bin(&self, binned: &RecordSet) -> Result<BTreeMap<Vec<Value>, Vec<String>>> {
        let id = binned.require_column(PROFILE_ID_COLUMN)?;
        let mids: Vec<usize> = self
            .0
            .keys()
            .map(|c| binned.require_column(&mid_column_name(c)))
            .collect::<Result<_>>()?;

        let mut bins: BTreeMap<Vec<Value>, Vec<String>> = BTreeMap::new();
        for row in binned.rows() {
            let key: Vec<Value> = mids.iter().map(|&i| row[i].clone()).collect();
            if key.iter().any(Value::is_null) {
                continue;
            }
            if let Some(profile) = row[id].as_str() {
                bins.entry(key).or_default().push(profile.to_string());
            }
        }
        Ok(bins)
    }

    /// Filter selecting the bin each coordinate of `location` falls in.
    /// Every located column must have bins.
    pub fn location_filter(&self, location: &BTreeMap<String, f64>) -> Result<FilterConfig> {
        let mut filter = FilterConfig::default();
        for (column, &value) in location {
            let spec = self
                .0
                .get(column)
                .ok_or_else(|| McsError::Config(format!("no bins given for {column}")))?;
            let (lo, hi) = spec.edges_around(value).ok_or_else(|| {
                McsError::Config(format!("{column} = {value} is outside the bins"))
            })?;
            filter.0.insert(column.clone(), Condition::Between(lo, hi));
        }
        Ok(filter)
    }
}
