//! The four pipeline stages and their sequencing
//!
//! ```text
//! CSV file ─load─▶ staging table ─extract─▶ CSV object ─transform─▶ Parquet object ─load_to_warehouse─▶ warehouse table
//! ```
//!
//! Each stage function is usable on its own. [`Pipeline::run`] chains them,
//! starting a stage only after its predecessor succeeded, and reports the
//! first failure as a [`RunError`] naming the stage.

use crate::dataset::{TableDefinition, TableRef};
use crate::error::{Result, RunError, Stage, StageContext};
use crate::etl::{IdentityTransformer, Step};
use crate::staging::{StagingStore, StagingTableReader, StagingTableWriter};
use crate::storage::{
    CsvFileReader, CsvObjectReader, CsvObjectWriter, ObjectPath, ObjectStore, ParquetObjectWriter,
};
use crate::transform::{CleaningPlan, ColumnSanitizer};
use crate::warehouse::{Destination, LoadJobRequest, Warehouse, WarehouseLoader};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

/// Loader: read a local CSV file, sanitize its column names and insert every
/// row into the staging table in one transaction
///
/// Returns the number of rows inserted.
pub async fn load<S: StagingStore>(
    store: &S,
    definition: &TableDefinition,
    source: &Path,
    table: &TableRef,
) -> Result<usize> {
    Step::new(
        "load",
        CsvFileReader::new(source),
        ColumnSanitizer::new(),
        StagingTableWriter::new(store, table.clone(), definition),
    )
    .run()
    .await
}

/// Extractor: export the whole staging table to `<bucket>/<schema>_<table>.csv`
///
/// Returns the path of the written object.
pub async fn extract<S: StagingStore, O: ObjectStore>(
    store: &S,
    objects: &O,
    bucket: &str,
    table: &TableRef,
) -> Result<ObjectPath> {
    let path = ObjectPath::staging_export(bucket, table.schema(), table.table());
    Step::new(
        "extract",
        StagingTableReader::new(store, table.clone()),
        IdentityTransformer::new(),
        CsvObjectWriter::new(objects, path.clone()),
    )
    .run()
    .await?;
    Ok(path)
}

/// Transformer: clean a CSV object and write it as Parquet
///
/// Returns the number of records written.
pub async fn transform<O: ObjectStore>(
    objects: &O,
    source: &ObjectPath,
    plan: &CleaningPlan,
    destination: &ObjectPath,
) -> Result<usize> {
    Step::new(
        "transform",
        CsvObjectReader::new(objects, source.clone()),
        plan.clone(),
        ParquetObjectWriter::new(objects, destination.clone()),
    )
    .run()
    .await
}

/// Warehouse Loader: ingest a Parquet object into `project_id.destination`
/// and wait for the job to finish
///
/// Returns the load job id.
pub async fn load_to_warehouse<W: Warehouse>(
    loader: &WarehouseLoader<'_, W>,
    source: &ObjectPath,
    project_id: &str,
    destination: &Destination,
) -> Result<String> {
    let request = LoadJobRequest::new(source.clone(), project_id, destination.clone());
    loader.load(&request).await
}

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub source_path: PathBuf,
    pub table: TableRef,
    pub bucket: String,
    pub cleaned_path: ObjectPath,
    pub cleaning: CleaningPlan,
    pub project_id: String,
    pub destination: Destination,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_loaded: usize,
    pub export_path: ObjectPath,
    pub rows_cleaned: usize,
    pub job_id: String,
}

/// The four stages bound to their collaborators
pub struct Pipeline<'a, S, O, W> {
    staging: &'a S,
    objects: &'a O,
    warehouse: WarehouseLoader<'a, W>,
    definition: TableDefinition,
}

impl<'a, S, O, W> Pipeline<'a, S, O, W>
where
    S: StagingStore,
    O: ObjectStore,
    W: Warehouse,
{
    pub fn new(
        staging: &'a S,
        objects: &'a O,
        warehouse: WarehouseLoader<'a, W>,
        definition: TableDefinition,
    ) -> Self {
        Self {
            staging,
            objects,
            warehouse,
            definition,
        }
    }

    /// Run all four stages in order
    ///
    /// # Errors
    /// The first stage failure, tagged with the stage. Later stages do not run.
    pub async fn run(&self, plan: &RunPlan) -> std::result::Result<RunSummary, RunError> {
        log::info!(
            "Stage 1/4 {}: {} -> {}",
            Stage::Loader.cyan(),
            plan.source_path.display().bright_black(),
            plan.table.bright_black()
        );
        let rows_loaded = load(self.staging, &self.definition, &plan.source_path, &plan.table)
            .await
            .stage(Stage::Loader)?;

        log::info!("Stage 2/4 {}: {}", Stage::Extractor.cyan(), plan.table.bright_black());
        let export_path = extract(self.staging, self.objects, &plan.bucket, &plan.table)
            .await
            .stage(Stage::Extractor)?;

        log::info!(
            "Stage 3/4 {}: {} -> {}",
            Stage::Transformer.cyan(),
            export_path.bright_black(),
            plan.cleaned_path.bright_black()
        );
        let rows_cleaned = transform(self.objects, &export_path, &plan.cleaning, &plan.cleaned_path)
            .await
            .stage(Stage::Transformer)?;

        log::info!(
            "Stage 4/4 {}: {} -> {}.{}",
            Stage::WarehouseLoader.cyan(),
            plan.cleaned_path.bright_black(),
            plan.project_id,
            plan.destination
        );
        let job_id = load_to_warehouse(
            &self.warehouse,
            &plan.cleaned_path,
            &plan.project_id,
            &plan.destination,
        )
        .await
        .stage(Stage::WarehouseLoader)?;

        Ok(RunSummary {
            rows_loaded,
            export_path,
            rows_cleaned,
            job_id,
        })
    }
}
