use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDateTime;

use crate::error::{McsError, Result};

/// Format used when a date-time cell is rendered as text.
pub const DATETIME_DISPLAY_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

// ---------------------------------------------------------------------------
// Value – a single cell of a record set
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Record sets are filtered through `BTreeSet`s, so `Value` must be `Ord`.
/// Equality, ordering and hashing all compare floats by bit pattern order
/// (`total_cmp`), so `NaN == NaN` and `0.0 != -0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Int(_) => 1,
                Float(_) => 2,
                DateTime(_) => 3,
                Text(_) => 4,
            }
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::DateTime(d) => write!(f, "{}", d.format(DATETIME_DISPLAY_FMT)),
            Value::Null => Ok(()),
        }
    }
}

impl Value {
    /// Interpret the value as an `f64` (integers widen, everything else is `None`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// ---------------------------------------------------------------------------
// RecordSet – the table returned by readers and loaders
// ---------------------------------------------------------------------------

/// One row of a [`RecordSet`], cells in column order.
pub type Row = Vec<Value>;

/// A table of observations with a fixed, ordered column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RecordSet {
    /// An empty record set with the given schema.
    pub fn new(columns: Vec<String>) -> Self {
        RecordSet {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from rows, checking every row against the schema width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        if rows.iter().any(|r| r.len() != columns.len()) {
            return Err(McsError::SchemaMismatch);
        }
        Ok(RecordSet { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| McsError::MissingColumn(name.to_string()))
    }

    /// Cell at (`row`, `column`).
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// All cells of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Sorted set of distinct values of a column.
    pub fn unique_values(&self, name: &str) -> Result<BTreeSet<Value>> {
        Ok(self.column(name)?.into_iter().cloned().collect())
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(McsError::SchemaMismatch);
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column; `values` must hold one cell per row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(McsError::SchemaMismatch);
        }
        if let Some(idx) = self.column_index(name) {
            for (row, v) in self.rows.iter_mut().zip(values) {
                row[idx] = v;
            }
        } else {
            self.columns.push(name.to_string());
            for (row, v) in self.rows.iter_mut().zip(values) {
                row.push(v);
            }
        }
        Ok(())
    }

    /// Derive a column from each row.
    pub fn add_derived_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&Row) -> Value,
    {
        let values: Vec<Value> = self.rows.iter().map(|r| f(r)).collect();
        self.add_column(name, values)
    }

    pub fn drop_column(&mut self, name: &str) {
        if let Some(idx) = self.column_index(name) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
    }

    /// Keep only the rows the predicate accepts.
    pub fn filter<F>(&self, mut keep: F) -> RecordSet
    where
        F: FnMut(&Row) -> bool,
    {
        RecordSet {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Project onto a subset of columns (in the order given).
    pub fn select_columns(&self, names: &[&str]) -> Result<RecordSet> {
        let idx: Vec<usize> = names
            .iter()
            .map(|n| self.require_column(n))
            .collect::<Result<_>>()?;
        Ok(RecordSet {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Append another record set with the identical schema.
    pub fn extend(&mut self, other: RecordSet) -> Result<()> {
        if other.columns != self.columns {
            return Err(McsError::SchemaMismatch);
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Left-join `right` onto `self` by a shared key column. Columns of
    /// `right` that already exist in `self` are skipped.
    pub fn left_join(&self, right: &RecordSet, key: &str) -> Result<RecordSet> {
        let left_key = self.require_column(key)?;
        let right_key = right.require_column(key)?;

        let extra: Vec<usize> = right
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !self.has_column(c))
            .map(|(i, _)| i)
            .collect();

        let lookup: HashMap<&Value, &Row> = right
            .rows
            .iter()
            .map(|r| (&r[right_key], r))
            .collect();

        let mut columns = self.columns.clone();
        columns.extend(extra.iter().map(|&i| right.columns[i].clone()));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = row.clone();
                match lookup.get(&row[left_key]) {
                    Some(r) => out.extend(extra.iter().map(|&i| r[i].clone())),
                    None => out.extend(extra.iter().map(|_| Value::Null)),
                }
                out
            })
            .collect();

        Ok(RecordSet { columns, rows })
    }
}
