//! Shopping ETL
//!
//! A four-stage batch pipeline for the customer shopping-behaviour dataset:
//!
//! 1. **Loader**: CSV file → relational staging table
//! 2. **Extractor**: staging table → CSV object in object storage
//! 3. **Transformer**: CSV object → deduplicated, null-filled Parquet object
//! 4. **Warehouse Loader**: Parquet object → warehouse table via a load job
//!
//! Stages run strictly in sequence; see [`stages::Pipeline`].

pub mod cli;
pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod etl;
pub mod stages;
pub mod staging;
pub mod storage;
pub mod transform;
pub mod warehouse;

// Re-exports for convenience
pub use config::RunConfig;
pub use dataset::{Dataset, TableDefinition, TableRef, Value};
pub use error::{RunError, Stage, StageError};
pub use etl::{Extractor, IdentityTransformer, Loader, Step, Transformer};
pub use stages::{Pipeline, RunPlan, RunSummary};
pub use storage::{AnyObjectStore, LocalObjectStore, ObjectPath, ObjectStore};
pub use transform::{CleaningPlan, ColumnSanitizer};
