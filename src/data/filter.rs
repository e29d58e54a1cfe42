use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{RecordSet, Value};
use super::reader::DT_COLUMN;
use crate::error::{McsError, Result};

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// If a column is absent it means "no filter" (show all).
pub type FilterState = BTreeMap<String, BTreeSet<Value>>;

/// Initialise a [`FilterState`] with all values of `columns` selected.
pub fn init_filter_state(records: &RecordSet, columns: &[&str]) -> Result<FilterState> {
    columns
        .iter()
        .map(|c| Ok((c.to_string(), records.unique_values(c)?)))
        .collect()
}

/// Return indices of rows that pass all active filters.
///
/// A row passes a column filter when:
/// * The column is not in the record set → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
pub fn filtered_indices(records: &RecordSet, filters: &FilterState) -> Vec<usize> {
    let active: Vec<(usize, &BTreeSet<Value>)> = filters
        .iter()
        .filter_map(|(col, selected)| records.column_index(col).map(|i| (i, selected)))
        .collect();
    records
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            active
                .iter()
                .all(|(i, selected)| selected.contains(&row[*i]))
        })
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Column selections
// ---------------------------------------------------------------------------

fn select_numeric<F>(records: &RecordSet, column: &str, keep: F) -> Result<RecordSet>
where
    F: Fn(f64) -> bool,
{
    let idx = records.require_column(column)?;
    Ok(records.filter(|row| row[idx].as_f64().is_some_and(&keep)))
}

/// Rows with `min < column <= max`. Nulls never pass.
pub fn select_range(records: &RecordSet, column: &str, min: f64, max: f64) -> Result<RecordSet> {
    select_numeric(records, column, |v| v > min && v <= max)
}

/// Rows with `min <= column <= max`.
pub fn select_between(records: &RecordSet, column: &str, min: f64, max: f64) -> Result<RecordSet> {
    select_numeric(records, column, |v| v >= min && v <= max)
}

/// Rows with `min <= column < max`.
pub fn select_half_open(records: &RecordSet, column: &str, min: f64, max: f64) -> Result<RecordSet> {
    select_numeric(records, column, |v| v >= min && v < max)
}

/// Rows whose `column` value is one of `values`.
pub fn select_values(
    records: &RecordSet,
    column: &str,
    values: &BTreeSet<Value>,
) -> Result<RecordSet> {
    let idx = records.require_column(column)?;
    Ok(records.filter(|row| values.contains(&row[idx])))
}

/// Rows with `start <= dt <= end`. Rows without a time are dropped.
pub fn select_time_range(
    records: &RecordSet,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<RecordSet> {
    let idx = records.require_column(DT_COLUMN)?;
    Ok(records.filter(|row| {
        row[idx]
            .as_datetime()
            .is_some_and(|dt| dt >= start && dt <= end)
    }))
}

// ---------------------------------------------------------------------------
// Filter files
// ---------------------------------------------------------------------------

/// One column condition of a filter file.
///
/// ```json
/// { "Profile_lat": { "between": [-10, 10] }, "Gqual": { "in": [0, 5, 6] } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Inclusive numeric range.
    Between(f64, f64),
    /// Allowed values; numbers match integers and floats alike.
    In(Vec<JsonValue>),
}

impl Condition {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Between(lo, hi) => value.as_f64().is_some_and(|v| v >= *lo && v <= *hi),
            Condition::In(allowed) => allowed.iter().any(|a| json_matches(a, value)),
        }
    }
}

fn json_matches(json: &JsonValue, value: &Value) -> bool {
    match (json, value) {
        (JsonValue::Null, Value::Null) => true,
        (JsonValue::Number(n), v) => match (n.as_f64(), v.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (JsonValue::String(s), Value::Text(t)) => s == t,
        (JsonValue::Bool(b), Value::Int(i)) => (*i != 0) == *b,
        _ => false,
    }
}

/// Column conditions read from a JSON filter file; all must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterConfig(pub BTreeMap<String, Condition>);

impl FilterConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| McsError::Config(format!("filter: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading filter from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Rows satisfying every condition. Unknown columns are an error.
    pub fn apply(&self, records: &RecordSet) -> Result<RecordSet> {
        let conditions: Vec<(usize, &Condition)> = self
            .0
            .iter()
            .map(|(col, cond)| Ok((records.require_column(col)?, cond)))
            .collect::<Result<_>>()?;
        Ok(records.filter(|row| conditions.iter().all(|(i, c)| c.matches(&row[*i]))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn sample() -> RecordSet {
        let cols = ["id", "lat", "Gqual", "dt"].iter().map(|s| s.to_string()).collect();
        let dt = |h| {
            Value::DateTime(
                NaiveDate::from_ymd_opt(2016, 1, 1)
                    .unwrap()
                    .and_hms_opt(h, 0, 0)
                    .unwrap(),
            )
        };
        RecordSet::from_rows(
            cols,
            vec![
                vec![Value::Text("a".into()), Value::Float(-20.0), Value::Int(0), dt(0)],
                vec![Value::Text("b".into()), Value::Float(-10.0), Value::Int(5), dt(1)],
                vec![Value::Text("c".into()), Value::Float(10.0), Value::Int(1), dt(2)],
                vec![Value::Text("d".into()), Value::Null, Value::Int(0), Value::Null],
            ],
        )
        .unwrap()
    }

    fn ids(rs: &RecordSet) -> Vec<String> {
        rs.column("id")
            .unwrap()
            .into_iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn range_bounds() {
        let rs = sample();
        assert_eq!(ids(&select_range(&rs, "lat", -10.0, 10.0).unwrap()), ["c"]);
        assert_eq!(ids(&select_between(&rs, "lat", -10.0, 10.0).unwrap()), ["b", "c"]);
        assert_eq!(ids(&select_half_open(&rs, "lat", -10.0, 10.0).unwrap()), ["b"]);
    }

    #[test]
    fn time_range_is_inclusive_and_drops_nulls() {
        let rs = sample();
        let start = NaiveDate::from_ymd_opt(2016, 1, 1).unwrap().and_hms_opt(1, 0, 0).unwrap();
        let end = start + chrono::Duration::hours(1);
        assert_eq!(ids(&select_time_range(&rs, start, end).unwrap()), ["b", "c"]);
    }

    #[test]
    fn filter_file_conditions() {
        let cfg = FilterConfig::from_json(
            r#"{ "lat": { "between": [-15, 15] }, "Gqual": { "in": [0, 5, 6] } }"#,
        )
        .unwrap();
        assert_eq!(ids(&cfg.apply(&sample()).unwrap()), ["b"]);
    }

    #[test]
    fn filter_on_unknown_column_fails() {
        let cfg = FilterConfig::from_json(r#"{ "nope": { "in": ["x"] } }"#).unwrap();
        assert!(matches!(cfg.apply(&sample()), Err(McsError::MissingColumn(_))));
    }

    #[test]
    fn malformed_filter_is_config_error() {
        assert!(matches!(
            FilterConfig::from_json(r#"{ "lat": { "around": 3 } }"#),
            Err(McsError::Config(_))
        ));
    }

    #[test]
    fn filter_state_starts_with_everything_selected() {
        let rs = sample();
        let mut state = init_filter_state(&rs, &["Gqual"]).unwrap();
        assert_eq!(filtered_indices(&rs, &state), vec![0, 1, 2, 3]);

        state.get_mut("Gqual").unwrap().remove(&Value::Int(0));
        assert_eq!(filtered_indices(&rs, &state), vec![1, 2]);

        state.get_mut("Gqual").unwrap().clear();
        assert!(filtered_indices(&rs, &state).is_empty());
    }
}
