//! Object-store addressing and dataset readers/writers over an object store

use super::csv::{read_csv, write_csv};
use super::parquet::write_parquet;
use crate::dataset::Dataset;
use crate::error::{Result, StageError};
use crate::etl::{Extractor, Loader};
use std::fmt;
use std::str::FromStr;

pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Address of one object: `bucket/key`
///
/// Parses from `bucket/key` or `gs://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    bucket: String,
    key: String,
}

impl ObjectPath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Export location of a staging table: `<bucket>/<schema>_<table>.csv`
    pub fn staging_export(bucket: &str, schema: &str, table: &str) -> Self {
        Self::new(bucket, format!("{}_{}.csv", schema, table))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `gs://bucket/key`
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectPath {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let rest = trimmed.strip_prefix("gs://").unwrap_or(trimmed);
        match rest.split_once('/') {
            Some((bucket, key))
                if !bucket.is_empty()
                    && !key.is_empty()
                    && !key.ends_with('/')
                    && !key.split('/').any(|part| part == ".." || part == ".") =>
            {
                Ok(Self::new(bucket, key))
            }
            _ => Err(format!("'{}' is not a bucket/key object path", s)),
        }
    }
}

/// Whole-object blob storage
///
/// Writes are all-or-nothing from the caller's point of view: after a failed
/// `put` no partial object is addressable at the path.
pub trait ObjectStore: Send + Sync {
    /// Write a whole object, replacing any existing one
    ///
    /// # Errors
    /// `WriteFailure` if the store rejects the write, `ConnectionFailure` if
    /// it cannot be reached
    fn put(
        &self,
        path: &ObjectPath,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Read a whole object
    ///
    /// # Errors
    /// `SourceUnreadable` if the object does not exist or cannot be read,
    /// `ConnectionFailure` if the store cannot be reached
    fn get(&self, path: &ObjectPath) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

/// Read a CSV object as a dataset
pub struct CsvObjectReader<'a, S> {
    store: &'a S,
    path: ObjectPath,
}

impl<'a, S: ObjectStore> CsvObjectReader<'a, S> {
    pub fn new(store: &'a S, path: ObjectPath) -> Self {
        Self { store, path }
    }
}

impl<S: ObjectStore> Extractor for CsvObjectReader<'_, S> {
    async fn extract(&self) -> Result<Dataset> {
        let bytes = self.store.get(&self.path).await?;
        log::debug!("Read {} bytes from {}", bytes.len(), self.path);
        read_csv(&bytes, &self.path.to_string())
    }
}

/// Write a dataset as a CSV object
pub struct CsvObjectWriter<'a, S> {
    store: &'a S,
    path: ObjectPath,
}

impl<'a, S: ObjectStore> CsvObjectWriter<'a, S> {
    pub fn new(store: &'a S, path: ObjectPath) -> Self {
        Self { store, path }
    }
}

impl<S: ObjectStore> Loader for CsvObjectWriter<'_, S> {
    async fn load(&self, dataset: Dataset) -> Result<usize> {
        let bytes = write_csv(&dataset).map_err(|e| StageError::write_failure(&self.path, e))?;
        self.store.put(&self.path, bytes, CSV_CONTENT_TYPE).await?;
        log::info!("Wrote {} records to {}", dataset.len(), self.path);
        Ok(dataset.len())
    }
}

/// Write a dataset as a Parquet object
pub struct ParquetObjectWriter<'a, S> {
    store: &'a S,
    path: ObjectPath,
}

impl<'a, S: ObjectStore> ParquetObjectWriter<'a, S> {
    pub fn new(store: &'a S, path: ObjectPath) -> Self {
        Self { store, path }
    }
}

impl<S: ObjectStore> Loader for ParquetObjectWriter<'_, S> {
    async fn load(&self, dataset: Dataset) -> Result<usize> {
        let bytes = write_parquet(&dataset).map_err(|e| StageError::write_failure(&self.path, e))?;
        self.store.put(&self.path, bytes, PARQUET_CONTENT_TYPE).await?;
        log::info!("Wrote {} records to {}", dataset.len(), self.path);
        Ok(dataset.len())
    }
}
