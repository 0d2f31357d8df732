//! Columnar (Parquet) encoding of datasets
//!
//! The Arrow schema is derived from the dataset schema: integer columns are
//! `Int64`, float columns `Float64`, text columns `Utf8`. Every field is
//! nullable.

use crate::dataset::{Column, Dataset, Schema, Value, ValueType};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

fn arrow_type(value_type: ValueType) -> DataType {
    match value_type {
        ValueType::Integer => DataType::Int64,
        ValueType::Float => DataType::Float64,
        ValueType::Text => DataType::Utf8,
    }
}

fn arrow_schema(schema: &Schema) -> Arc<ArrowSchema> {
    Arc::new(ArrowSchema::new(
        schema
            .columns()
            .iter()
            .map(|c| Field::new(c.name.as_str(), arrow_type(c.value_type), true))
            .collect::<Vec<_>>(),
    ))
}

fn column_array(dataset: &Dataset, index: usize, value_type: ValueType) -> ArrayRef {
    let values = dataset.records().iter().map(|r| &r[index]);
    match value_type {
        ValueType::Integer => Arc::new(Int64Array::from(
            values
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ValueType::Float => Arc::new(Float64Array::from(
            values
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ValueType::Text => Arc::new(StringArray::from(
            values
                .map(|v| match v {
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    }
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Encode a dataset as a single-row-group Parquet file
pub fn write_parquet(dataset: &Dataset) -> Result<Vec<u8>, parquet::errors::ParquetError> {
    let schema = arrow_schema(dataset.schema());
    let columns: Vec<ArrayRef> = dataset
        .schema()
        .columns()
        .iter()
        .enumerate()
        .map(|(index, c)| column_array(dataset, index, c.value_type))
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}

/// Decode a Parquet file written by [`write_parquet`]
///
/// # Errors
/// Returns a description of the problem if the bytes are not Parquet or a
/// column type has no dataset equivalent.
pub fn read_parquet(bytes: Bytes) -> Result<Dataset, String> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .map_err(|e| format!("parquet reader init failed: {e}"))?;

    let mut columns = Vec::new();
    for field in builder.schema().fields() {
        let value_type = match field.data_type() {
            DataType::Int64 => ValueType::Integer,
            DataType::Float64 => ValueType::Float,
            DataType::Utf8 => ValueType::Text,
            other => return Err(format!("column '{}' has unsupported type {other}", field.name())),
        };
        columns.push(Column::new(field.name().as_str(), value_type));
    }
    let schema = Schema::new(columns).map_err(|e| e.to_string())?;

    let reader = builder
        .build()
        .map_err(|e| format!("parquet reader build failed: {e}"))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| format!("parquet read batch failed: {e}"))?;
        for row in 0..batch.num_rows() {
            let record = schema
                .columns()
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let array = batch.column(index);
                    if array.is_null(row) {
                        return Value::Null;
                    }
                    match column.value_type {
                        ValueType::Integer => Value::Int(array.as_primitive::<Int64Type>().value(row)),
                        ValueType::Float => Value::Float(array.as_primitive::<Float64Type>().value(row)),
                        ValueType::Text => Value::Text(array.as_string::<i32>().value(row).to_string()),
                    }
                })
                .collect();
            records.push(record);
        }
    }

    Dataset::new(schema, records).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::read_csv;

    #[test]
    fn test_parquet_preserves_types_and_nulls() {
        let dataset = read_csv(
            b"Customer_ID,Review_Rating,Gender\n1,4.0,Male\n2,,\n3,3.5,Female\n",
            "inline",
        )
        .unwrap();

        let bytes = write_parquet(&dataset).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");

        let decoded = read_parquet(Bytes::from(bytes)).unwrap();
        assert_eq!(decoded, dataset);
        assert_eq!(decoded.get(1, "Review_Rating"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_dataset_keeps_schema() {
        let dataset = read_csv(b"a,b\n", "inline").unwrap();
        let decoded = read_parquet(Bytes::from(write_parquet(&dataset).unwrap())).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.schema().names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(read_parquet(Bytes::from_static(b"not parquet at all")).is_err());
    }
}
