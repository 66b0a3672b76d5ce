use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::model::{ScalarEvent, TidyTable};
use crate::error::{Error, Result};

/// Column names of the tidy export, in order.
pub const TIDY_COLUMNS: [&str; 4] = ["tag", "step", "wall_time", "value"];

// ---------------------------------------------------------------------------
// Format dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Json,
    Parquet,
}

impl TableFormat {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" => Ok(TableFormat::Csv),
            "json" => Ok(TableFormat::Json),
            "parquet" | "pq" => Ok(TableFormat::Parquet),
            other => Err(Error::InvalidArgument(format!(
                "unsupported table extension '.{other}' for {} (use .csv, .json or .parquet)",
                path.display()
            ))),
        }
    }
}

/// Load a tidy table from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header `tag,step,wall_time,value`
/// * `.json`    – `[{ "tag": ..., "step": ..., "wall_time": ..., "value": ... }, ...]`
/// * `.parquet` – columns `tag` (utf8), `step` (uint64 or int64), `wall_time`, `value` (float64)
pub fn load_table(path: &Path) -> Result<TidyTable> {
    let format = TableFormat::from_path(path)?;
    if !path.is_file() {
        return Err(Error::not_found("table file", path));
    }
    let rows = match format {
        TableFormat::Csv => read_csv(path)?,
        TableFormat::Json => read_json(path)?,
        TableFormat::Parquet => read_parquet(path)?,
    };
    TidyTable::from_rows(rows)
        .map_err(|_| Error::MalformedInput(format!("{} contains no rows", path.display())))
}

/// Write a tidy table, creating parent directories as needed.
pub fn save_table(table: &TidyTable, path: &Path) -> Result<()> {
    let format = TableFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    match format {
        TableFormat::Csv => write_csv(table, path)?,
        TableFormat::Json => write_json(table, path)?,
        TableFormat::Parquet => write_parquet(table, path)?,
    }
    info!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<Vec<ScalarEvent>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    for column in TIDY_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::MalformedInput(format!(
                "{} is missing the '{column}' column",
                path.display()
            )));
        }
    }

    let mut rows = Vec::new();
    for (row_no, record) in reader.deserialize::<ScalarEvent>().enumerate() {
        let row = record.map_err(|e| {
            Error::MalformedInput(format!("{} row {}: {e}", path.display(), row_no + 1))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_csv(table: &TidyTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in table.rows() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn read_json(path: &Path) -> Result<Vec<ScalarEvent>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::MalformedInput(format!("{}: {e}", path.display())))
}

fn write_json(table: &TidyTable, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), table.rows())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn tidy_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("tag", DataType::Utf8, false),
        Field::new("step", DataType::UInt64, false),
        Field::new("wall_time", DataType::Float64, false),
        Field::new("value", DataType::Float64, false),
    ]))
}

fn write_parquet(table: &TidyTable, path: &Path) -> Result<()> {
    let rows = table.rows();
    let tags = StringArray::from(rows.iter().map(|r| r.tag.as_str()).collect::<Vec<_>>());
    let steps = UInt64Array::from(rows.iter().map(|r| r.step).collect::<Vec<_>>());
    let wall_times = Float64Array::from(rows.iter().map(|r| r.wall_time).collect::<Vec<_>>());
    let values = Float64Array::from(rows.iter().map(|r| r.value).collect::<Vec<_>>());

    let schema = tidy_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(tags) as ArrayRef,
            Arc::new(steps),
            Arc::new(wall_times),
            Arc::new(values),
        ],
    )?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Read a tidy table from Parquet. Works with files written by this crate and
/// by pandas (`df.to_parquet()`, which stores `step` as int64).
fn read_parquet(path: &Path) -> Result<Vec<ScalarEvent>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let tags = column(&batch, "tag", path)?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| column_type_error(path, "tag", "utf8"))?;
        let steps = step_values(column(&batch, "step", path)?, path)?;
        let wall_times = float_column(column(&batch, "wall_time", path)?, path, "wall_time")?;
        let values = float_column(column(&batch, "value", path)?, path, "value")?;

        for row in 0..batch.num_rows() {
            if tags.is_null(row) {
                return Err(Error::MalformedInput(format!(
                    "{} row {}: null tag",
                    path.display(),
                    row + 1
                )));
            }
            rows.push(ScalarEvent::new(
                tags.value(row),
                steps[row],
                nullable_f64(wall_times, row),
                nullable_f64(values, row),
            ));
        }
    }
    Ok(rows)
}

fn column<'a>(batch: &'a RecordBatch, name: &str, path: &Path) -> Result<&'a ArrayRef> {
    let idx = batch.schema().index_of(name).map_err(|_| {
        Error::MalformedInput(format!("{} is missing the '{name}' column", path.display()))
    })?;
    Ok(batch.column(idx))
}

fn step_values(col: &ArrayRef, path: &Path) -> Result<Vec<u64>> {
    let null_step = |row: usize| {
        Error::MalformedInput(format!("{} row {}: null step", path.display(), row + 1))
    };
    if let Some(arr) = col.as_any().downcast_ref::<UInt64Array>() {
        return arr
            .iter()
            .enumerate()
            .map(|(row, v)| v.ok_or_else(|| null_step(row)))
            .collect();
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        return arr
            .iter()
            .enumerate()
            .map(|(row, v)| {
                let v = v.ok_or_else(|| null_step(row))?;
                u64::try_from(v).map_err(|_| {
                    Error::MalformedInput(format!(
                        "{} row {}: negative step {v}",
                        path.display(),
                        row + 1
                    ))
                })
            })
            .collect();
    }
    Err(column_type_error(path, "step", "uint64 or int64"))
}

fn float_column<'a>(col: &'a ArrayRef, path: &Path, name: &str) -> Result<&'a Float64Array> {
    col.as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| column_type_error(path, name, "float64"))
}

fn nullable_f64(arr: &Float64Array, row: usize) -> f64 {
    if arr.is_null(row) {
        f64::NAN
    } else {
        arr.value(row)
    }
}

fn column_type_error(path: &Path, column: &str, expected: &str) -> Error {
    Error::MalformedInput(format!(
        "{}: column '{column}' should be {expected}",
        path.display()
    ))
}
