// src/export.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::{Map, Value};
use std::{fs::File, io::BufWriter, path::Path, sync::Arc};
use tracing::{info, instrument};

use crate::record::{Lookup, Record};

pub const BIRTHPLACE_COLUMN: &str = "Birthplace";
pub const LATITUDE_COLUMN: &str = "Latitude";
pub const LONGITUDE_COLUMN: &str = "Longitude";
pub const STATUS_COLUMN: &str = "Status";

/// Source headers across all records, first-seen order.
fn source_columns(records: &[Record]) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    for (header, _) in records.iter().flat_map(|r| r.fields.iter()) {
        if !cols.contains(header) {
            cols.push(header.clone());
        }
    }
    cols
}

/// `ok` when plottable, else the reason that stopped it.
fn status(record: &Record) -> String {
    match (&record.birthplace, &record.location) {
        (_, Some(Lookup::Resolved(_))) => "ok".to_string(),
        _ => record
            .blocking_reason()
            .map(ToString::to_string)
            .unwrap_or_else(|| "pending".to_string()),
    }
}

pub fn build_schema(records: &[Record]) -> Schema {
    let mut fields: Vec<Field> = source_columns(records)
        .into_iter()
        .map(|c| Field::new(c, DataType::Utf8, true))
        .collect();
    fields.push(Field::new(BIRTHPLACE_COLUMN, DataType::Utf8, true));
    fields.push(Field::new(LATITUDE_COLUMN, DataType::Float64, true));
    fields.push(Field::new(LONGITUDE_COLUMN, DataType::Float64, true));
    fields.push(Field::new(STATUS_COLUMN, DataType::Utf8, false));
    Schema::new(fields)
}

pub fn to_record_batch(records: &[Record]) -> Result<RecordBatch> {
    let schema = Arc::new(build_schema(records));

    let mut arrays: Vec<ArrayRef> = source_columns(records)
        .iter()
        .map(|col| {
            Arc::new(StringArray::from(
                records
                    .iter()
                    .map(|r| r.field(col).map(str::to_owned))
                    .collect::<Vec<Option<String>>>(),
            )) as ArrayRef
        })
        .collect();
    arrays.push(Arc::new(StringArray::from(
        records
            .iter()
            .map(|r| r.birthplace_text().map(str::to_owned))
            .collect::<Vec<Option<String>>>(),
    )));
    arrays.push(Arc::new(Float64Array::from(
        records
            .iter()
            .map(|r| r.coordinate().map(|c| c.latitude))
            .collect::<Vec<Option<f64>>>(),
    )));
    arrays.push(Arc::new(Float64Array::from(
        records
            .iter()
            .map(|r| r.coordinate().map(|c| c.longitude))
            .collect::<Vec<Option<f64>>>(),
    )));
    arrays.push(Arc::new(StringArray::from(
        records.iter().map(status).collect::<Vec<String>>(),
    )));

    RecordBatch::try_new(schema, arrays).context("building enriched record batch")
}

/// Write the enriched table as a single Parquet file.
#[instrument(level = "info", skip(records), fields(rows = records.len()))]
pub fn write_parquet(records: &[Record], path: &Path) -> Result<()> {
    let batch = to_record_batch(records)?;
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating Arrow writer for export")?;
    writer.write(&batch).context("writing export batch")?;
    writer.close().context("closing export writer")?;
    info!(path = %path.display(), "wrote parquet export");
    Ok(())
}

pub fn to_json_rows(records: &[Record]) -> Vec<Value> {
    records
        .iter()
        .map(|r| {
            let mut row = Map::new();
            for (header, value) in &r.fields {
                row.insert(header.clone(), Value::String(value.clone()));
            }
            row.insert(
                BIRTHPLACE_COLUMN.to_string(),
                r.birthplace_text().map_or(Value::Null, |b| Value::String(b.to_string())),
            );
            let coord = r.coordinate();
            row.insert(
                LATITUDE_COLUMN.to_string(),
                coord.map_or(Value::Null, |c| Value::from(c.latitude)),
            );
            row.insert(
                LONGITUDE_COLUMN.to_string(),
                coord.map_or(Value::Null, |c| Value::from(c.longitude)),
            );
            row.insert(STATUS_COLUMN.to_string(), Value::String(status(r)));
            Value::Object(row)
        })
        .collect()
}

#[instrument(level = "info", skip(records), fields(rows = records.len()))]
pub fn write_json(records: &[Record], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &to_json_rows(records))
        .with_context(|| format!("writing {:?}", path))?;
    info!(path = %path.display(), "wrote json export");
    Ok(())
}
