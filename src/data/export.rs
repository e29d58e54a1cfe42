use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use parquet::arrow::ArrowWriter;

use super::model::{RecordSet, Value};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a record set to a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – typed columns (Int64 / Float64 / Timestamp / Utf8)
/// * `.csv`     – header row, nulls as empty cells
pub fn write_file(records: &RecordSet, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => write_parquet(records, path),
        "csv" => write_csv(records, path),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

/// First `n` rows rendered as a text table.
pub fn preview(records: &RecordSet, n: usize) -> Result<String> {
    let batch = to_record_batch(records)?;
    let head = batch.slice(0, n.min(batch.num_rows()));
    Ok(pretty_format_batches(&[head])
        .context("formatting preview")?
        .to_string())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

pub fn write_csv(records: &RecordSet, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(records.columns())?;
    for row in records.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Arrow type a column is stored as: the narrowest type holding every
/// non-null value. Mixed kinds fall back to text.
fn column_type(records: &RecordSet, idx: usize) -> DataType {
    let mut ty: Option<DataType> = None;
    for row in records.rows() {
        let this = match &row[idx] {
            Value::Null => continue,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::DateTime(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
            Value::Text(_) => return DataType::Utf8,
        };
        ty = match (ty, this) {
            (None, t) => Some(t),
            (Some(a), b) if a == b => Some(a),
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                Some(DataType::Float64)
            }
            _ => return DataType::Utf8,
        };
    }
    ty.unwrap_or(DataType::Utf8)
}

fn build_array(records: &RecordSet, idx: usize, ty: &DataType) -> ArrayRef {
    let cells = records.rows().iter().map(|r| &r[idx]);
    match ty {
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(records.len());
            for v in cells {
                b.append_option(match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(records.len());
            for v in cells {
                b.append_option(v.as_f64());
            }
            Arc::new(b.finish())
        }
        DataType::Timestamp(_, _) => {
            let mut b = TimestampMillisecondBuilder::with_capacity(records.len());
            for v in cells {
                b.append_option(v.as_datetime().map(|d| d.and_utc().timestamp_millis()));
            }
            Arc::new(b.finish())
        }
        _ => {
            let mut b = StringBuilder::new();
            for v in cells {
                if v.is_null() {
                    b.append_null();
                } else {
                    b.append_value(v.to_string());
                }
            }
            Arc::new(b.finish())
        }
    }
}

/// Convert to a single Arrow batch.
pub fn to_record_batch(records: &RecordSet) -> Result<RecordBatch> {
    let types: Vec<DataType> = (0..records.columns().len())
        .map(|i| column_type(records, i))
        .collect();
    let schema = Arc::new(Schema::new(
        records
            .columns()
            .iter()
            .zip(&types)
            .map(|(name, ty)| Field::new(name, ty.clone(), true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = types
        .iter()
        .enumerate()
        .map(|(i, ty)| build_array(records, i, ty))
        .collect();
    RecordBatch::try_new(schema, arrays).context("building record batch")
}

pub fn write_parquet(records: &RecordSet, path: &Path) -> Result<()> {
    let batch = to_record_batch(records)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .context("creating Parquet writer")?;
    writer.write(&batch).context("writing Parquet batch")?;
    writer.close().context("closing Parquet writer")?;
    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use pretty_assertions::assert_eq;

    fn sample() -> RecordSet {
        let dt = NaiveDate::from_ymd_opt(2016, 1, 1)
            .unwrap()
            .and_hms_milli_opt(0, 0, 1, 500)
            .unwrap();
        RecordSet::from_rows(
            ["Profile_identifier", "level", "T", "dt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![
                vec![
                    Value::Text("160101000000_0".into()),
                    Value::Int(0),
                    Value::Float(210.5),
                    Value::DateTime(dt),
                ],
                vec![
                    Value::Text("160101000000_0".into()),
                    Value::Int(1),
                    Value::Null,
                    Value::DateTime(dt),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn csv_has_header_and_empty_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_file(&sample(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Profile_identifier,level,T,dt");
        assert_eq!(lines[1], "160101000000_0,0,210.5,2016-01-01T00:00:01.500");
        assert_eq!(lines[2], "160101000000_0,1,,2016-01-01T00:00:01.500");
    }

    #[test]
    fn parquet_columns_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        write_file(&sample(), &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let schema = batches[0].schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert!(matches!(schema.field(3).data_type(), DataType::Timestamp(_, _)));
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_file(&sample(), &dir.path().join("out.xlsx")).is_err());
    }

    #[test]
    fn preview_limits_rows() {
        let text = preview(&sample(), 1).unwrap();
        assert!(text.contains("210.5"));
        assert!(!text.contains("| 1 "));
    }
}
