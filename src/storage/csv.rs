//! Delimited text (CSV) reading and writing
//!
//! The row-oriented artifact format: a header row, then one line per record
//! with values positionally ordered to the schema. Nulls are written as
//! empty fields.

use crate::dataset::{Dataset, is_missing_marker};
use crate::error::{Result, StageError};
use crate::etl::Extractor;
use std::path::{Path, PathBuf};

/// Header names and raw fields, with missing markers already turned into `None`
type RawTable = (Vec<String>, Vec<Vec<Option<String>>>);

/// Parse CSV bytes into a dataset, inferring each column's type
///
/// `origin` names the source in error messages. Short rows are padded with
/// nulls; rows with more fields than the header are malformed.
///
/// # Errors
/// `SourceUnreadable` if there is no header, a row is too long, or the
/// content is not valid UTF-8 CSV. `SchemaConflict` if two header names
/// collide.
pub fn read_csv(bytes: &[u8], origin: &str) -> Result<Dataset> {
    let (names, rows) = read_raw(bytes, origin)?;
    Dataset::infer(names, rows)
}

/// Parse CSV bytes into a dataset whose columns are all text
///
/// Every non-null field is kept exactly as written (`08` stays `08`), so a
/// [`TableDefinition`](crate::dataset::TableDefinition) can bind the declared
/// type to the original text.
///
/// # Errors
/// As [`read_csv`].
pub fn read_csv_text(bytes: &[u8], origin: &str) -> Result<Dataset> {
    let (names, rows) = read_raw(bytes, origin)?;
    Dataset::from_text(names, rows)
}

fn read_raw(bytes: &[u8], origin: &str) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let names: Vec<String> = reader
        .headers()
        .map_err(|e| StageError::source_unreadable(origin, e))?
        .iter()
        .map(str::to_string)
        .collect();
    if names.is_empty() || names.iter().all(String::is_empty) {
        return Err(StageError::source_unreadable(origin, "missing header row"));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| StageError::source_unreadable(origin, e))?;
        if record.len() > names.len() {
            return Err(StageError::source_unreadable(
                origin,
                format!(
                    "record {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    names.len()
                ),
            ));
        }
        let mut row: Vec<Option<String>> = record
            .iter()
            .map(|field| (!is_missing_marker(field)).then(|| field.to_string()))
            .collect();
        row.resize(names.len(), None);
        rows.push(row);
    }

    Ok((names, rows))
}

/// Serialize a dataset as CSV with a header row
pub fn write_csv(dataset: &Dataset) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.schema().names())?;
    for record in dataset.records() {
        writer.write_record(record.iter().map(|v| v.to_string()))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Read a CSV file from local disk
///
/// Fields are read as text; the staging table's declared types decide how
/// each one is stored.
pub struct CsvFileReader {
    path: PathBuf,
}

impl CsvFileReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the whole file as a dataset
    pub fn read(&self) -> Result<Dataset> {
        let origin = self.path.display().to_string();
        let bytes = std::fs::read(&self.path)
            .map_err(|e| StageError::source_unreadable(&origin, e))?;
        read_csv_text(&bytes, &origin)
    }
}

impl Extractor for CsvFileReader {
    async fn extract(&self) -> Result<Dataset> {
        log::debug!("Reading CSV file {}", self.path.display());
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Value, ValueType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_nulls_and_types() {
        let csv = "Customer ID,Age,Review Rating,Gender\n1,25,,Male\n2,31,4.0,NA\n";
        let dataset = read_csv(csv.as_bytes(), "inline").unwrap();

        assert_eq!(dataset.len(), 2);
        let types: Vec<ValueType> = dataset.schema().columns().iter().map(|c| c.value_type).collect();
        assert_eq!(
            types,
            vec![ValueType::Integer, ValueType::Integer, ValueType::Float, ValueType::Text]
        );
        assert_eq!(dataset.get(0, "Review Rating"), Some(&Value::Null));
        assert_eq!(dataset.get(1, "Review Rating"), Some(&Value::Float(4.0)));
        assert_eq!(dataset.get(1, "Gender"), Some(&Value::Null));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let dataset = read_csv(b"a,b,c\n1,2\n", "inline").unwrap();
        assert_eq!(dataset.get(0, "c"), Some(&Value::Null));
    }

    #[test]
    fn test_long_rows_are_malformed() {
        let err = read_csv(b"a,b\n1,2,3\n", "inline").unwrap_err();
        assert_eq!(err.code(), "SourceUnreadable");
        assert!(err.to_string().contains("record 1"));
    }

    #[test]
    fn test_empty_input_is_unreadable() {
        let err = read_csv(b"", "inline").unwrap_err();
        assert_eq!(err.code(), "SourceUnreadable");
    }

    #[test]
    fn test_invalid_utf8_is_unreadable() {
        let err = read_csv(b"a\n\xff\xfe\n", "inline").unwrap_err();
        assert_eq!(err.code(), "SourceUnreadable");
    }

    #[test]
    fn test_write_then_read_keeps_floats_and_nulls() {
        let source = "id,rating,note\n1,4.0,\n2,,\"a, b\"\n";
        let dataset = read_csv(source.as_bytes(), "inline").unwrap();
        let written = String::from_utf8(write_csv(&dataset).unwrap()).unwrap();
        assert_eq!(written, "id,rating,note\n1,4.0,\n2,,\"a, b\"\n");
        assert_eq!(read_csv(written.as_bytes(), "again").unwrap(), dataset);
    }

    #[test]
    fn test_file_reader_missing_file() {
        let err = CsvFileReader::new("/nonexistent/shopping.csv").read().unwrap_err();
        assert_eq!(err.code(), "SourceUnreadable");
    }

    #[tokio::test]
    async fn test_file_reader_extracts() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, "Customer ID,Age\n1,25\n2,40\n").unwrap();

        let dataset = CsvFileReader::new(temp.path()).extract().await.unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1, "Age"), Some(&Value::Text("40".into())));
    }

    #[test]
    fn test_text_read_keeps_fields_verbatim() {
        let dataset = read_csv_text(b"Size,Promo Code Used,Rating
08,+1,
10,1.50,4
", "inline").unwrap();
        assert!(dataset.schema().columns().iter().all(|c| c.value_type == ValueType::Text));
        assert_eq!(dataset.get(0, "Size"), Some(&Value::Text("08".into())));
        assert_eq!(dataset.get(0, "Promo Code Used"), Some(&Value::Text("+1".into())));
        assert_eq!(dataset.get(1, "Promo Code Used"), Some(&Value::Text("1.50".into())));
        assert_eq!(dataset.get(0, "Rating"), Some(&Value::Null));
    }

    #[test]
    fn test_duplicate_headers_are_schema_conflict() {
        let err = read_csv(b"Customer ID,Customer ID
1,2
", "dup.csv").unwrap_err();
        assert_eq!(err.code(), "SchemaConflict");
        let err = read_csv_text(b"Customer ID,Customer ID
1,2
", "dup.csv").unwrap_err();
        assert_eq!(err.code(), "SchemaConflict");
    }
}
