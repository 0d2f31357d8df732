//! Artifact formats and object storage
//!
//! This module handles:
//! - CSV reading/writing (row-oriented artifacts)
//! - Parquet reading/writing (columnar artifacts)
//! - Object-store addressing and the local and Cloud Storage stores

pub mod csv;
mod gcs;
mod local;
mod object;
pub mod parquet;

pub use self::csv::{CsvFileReader, read_csv, read_csv_text, write_csv};
pub use gcs::{GCS_ENDPOINT, GcsObjectStore};
pub use local::LocalObjectStore;
pub use object::{
    CSV_CONTENT_TYPE, CsvObjectReader, CsvObjectWriter, ObjectPath, ObjectStore,
    PARQUET_CONTENT_TYPE, ParquetObjectWriter,
};
pub use self::parquet::{read_parquet, write_parquet};

use crate::error::Result;

/// Object store selected at run time
#[derive(Debug, Clone)]
pub enum AnyObjectStore {
    Local(LocalObjectStore),
    Gcs(GcsObjectStore),
}

impl ObjectStore for AnyObjectStore {
    async fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        match self {
            Self::Local(store) => store.put(path, bytes, content_type).await,
            Self::Gcs(store) => store.put(path, bytes, content_type).await,
        }
    }

    async fn get(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        match self {
            Self::Local(store) => store.get(path).await,
            Self::Gcs(store) => store.get(path).await,
        }
    }
}
