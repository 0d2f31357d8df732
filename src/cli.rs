//! CLI helper functions
//!
//! Builds the configured adapters and runs either the whole pipeline or a
//! single stage.

use crate::{
    client::GoogleClient,
    config::{RunConfig, StagingBackend, StorageBackend, WarehouseBackend},
    dataset::{SqlDialect, TableDefinition},
    error::{RunError, Stage, StageContext},
    stages::{self, Pipeline, RunPlan, RunSummary},
    staging::{AnyStagingStore, PostgresStore, SqliteStore},
    storage::{AnyObjectStore, GcsObjectStore, LocalObjectStore, ObjectPath},
    warehouse::{AnyWarehouse, BigQueryWarehouse, LocalWarehouse, WarehouseLoader},
};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Build the staging store selected by `STAGING_BACKEND`
pub fn staging_store(config: &RunConfig) -> AnyStagingStore {
    match config.staging_backend {
        StagingBackend::Postgres => {
            let pg = &config.postgres;
            AnyStagingStore::Postgres(PostgresStore::new(
                &pg.host,
                pg.port,
                &pg.dbname,
                &pg.user,
                &pg.password,
            ))
        }
        StagingBackend::Sqlite => AnyStagingStore::Sqlite(SqliteStore::new(&config.sqlite_dir)),
    }
}

fn google_client(endpoint: &str, config: &RunConfig) -> Result<GoogleClient> {
    let url = Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL: {}", endpoint))?;
    GoogleClient::try_new(url, config.auth.clone())
        .with_context(|| format!("Failed to create client for {}", endpoint))
}

/// Build the object store selected by `STORAGE_BACKEND`
pub fn object_store(config: &RunConfig) -> Result<AnyObjectStore> {
    Ok(match config.storage_backend {
        StorageBackend::Gcs => {
            AnyObjectStore::Gcs(GcsObjectStore::new(google_client(&config.gcs_endpoint, config)?))
        }
        StorageBackend::Local => AnyObjectStore::Local(LocalObjectStore::new(&config.local_data_dir)),
    })
}

/// Build the warehouse selected by `WAREHOUSE_BACKEND`
///
/// The local warehouse reads cleaned files through `objects`.
pub fn warehouse(config: &RunConfig, objects: AnyObjectStore) -> Result<AnyWarehouse> {
    Ok(match config.warehouse_backend {
        WarehouseBackend::Bigquery => {
            let mut bigquery = BigQueryWarehouse::new(google_client(&config.bigquery_endpoint, config)?);
            if let Some(location) = &config.bigquery_location {
                bigquery = bigquery.with_location(location);
            }
            AnyWarehouse::BigQuery(bigquery)
        }
        WarehouseBackend::Local => {
            AnyWarehouse::Local(LocalWarehouse::new(objects, &config.local_warehouse_dir))
        }
    })
}

fn warehouse_loader<'a>(
    config: &RunConfig,
    warehouse: &'a AnyWarehouse,
    cancel: &CancellationToken,
) -> WarehouseLoader<'a, AnyWarehouse> {
    WarehouseLoader::new(warehouse)
        .with_poll_interval(config.load_job_poll_interval)
        .with_timeout(config.load_job_timeout)
        .with_cancellation(cancel.clone())
}

pub fn run_plan(config: &RunConfig) -> RunPlan {
    RunPlan {
        source_path: config.csv_file_path.clone(),
        table: config.table.clone(),
        bucket: config.bucket.clone(),
        cleaned_path: config.cleaned_path.clone(),
        cleaning: config.cleaning.clone(),
        project_id: config.project_id.clone(),
        destination: config.destination.clone(),
    }
}

/// Run all four stages, retrying the whole run after a failure
///
/// A run is attempted `config.retries + 1` times with `config.retry_delay`
/// between attempts. Cancelling `cancel` stops further attempts.
pub async fn run_pipeline(config: &RunConfig, cancel: &CancellationToken) -> Result<std::result::Result<RunSummary, RunError>> {
    let staging = staging_store(config);
    let objects = object_store(config)?;
    let warehouse = warehouse(config, objects.clone())?;
    let pipeline = Pipeline::new(
        &staging,
        &objects,
        warehouse_loader(config, &warehouse, cancel),
        TableDefinition::shopping_behavior(),
    );
    let plan = run_plan(config);

    let attempts = config.retries + 1;
    let mut attempt = 1;
    loop {
        match pipeline.run(&plan).await {
            Ok(summary) => return Ok(Ok(summary)),
            Err(e) if attempt < attempts && !cancel.is_cancelled() => {
                log::warn!(
                    "Attempt {}/{} failed: {}; retrying in {}s",
                    attempt,
                    attempts,
                    e,
                    config.retry_delay.as_secs().cyan()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(Err(e)),
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Ok(Err(e)),
        }
    }
}

/// Loader stage only
pub async fn load_stage(config: &RunConfig, source: &Path) -> Result<std::result::Result<usize, RunError>> {
    let staging = staging_store(config);
    Ok(
        stages::load(&staging, &TableDefinition::shopping_behavior(), source, &config.table)
            .await
            .stage(Stage::Loader),
    )
}

/// Extractor stage only
pub async fn extract_stage(config: &RunConfig) -> Result<std::result::Result<ObjectPath, RunError>> {
    let staging = staging_store(config);
    let objects = object_store(config)?;
    Ok(stages::extract(&staging, &objects, &config.bucket, &config.table)
        .await
        .stage(Stage::Extractor))
}

/// Transformer stage only
pub async fn transform_stage(
    config: &RunConfig,
    source: &ObjectPath,
    destination: &ObjectPath,
) -> Result<std::result::Result<usize, RunError>> {
    let objects = object_store(config)?;
    Ok(stages::transform(&objects, source, &config.cleaning, destination)
        .await
        .stage(Stage::Transformer))
}

/// Warehouse Loader stage only
pub async fn warehouse_stage(
    config: &RunConfig,
    source: &ObjectPath,
    cancel: &CancellationToken,
) -> Result<std::result::Result<String, RunError>> {
    let objects = object_store(config)?;
    let warehouse = warehouse(config, objects)?;
    let loader = warehouse_loader(config, &warehouse, cancel);
    Ok(
        stages::load_to_warehouse(&loader, source, &config.project_id, &config.destination)
            .await
            .stage(Stage::WarehouseLoader),
    )
}

/// Staging table DDL for the configured backend
pub fn schema_ddl(config: &RunConfig, backend: Option<StagingBackend>) -> String {
    let dialect = match backend.unwrap_or(config.staging_backend) {
        StagingBackend::Postgres => SqlDialect::Postgres,
        StagingBackend::Sqlite => SqlDialect::Sqlite,
    };
    TableDefinition::shopping_behavior().create_table_sql(&config.table, dialect)
}
