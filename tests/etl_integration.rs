//! Integration tests for the four-stage pipeline
//!
//! These run every stage for real against the SQLite staging store, the
//! directory object store and the directory warehouse.

use shopping_etl::dataset::{TableDefinition, TableRef, Value};
use shopping_etl::error::{LoadJobCause, Stage, StageError};
use shopping_etl::stages::{self, Pipeline, RunPlan};
use shopping_etl::staging::{SqliteStore, StagingConnection, StagingStore};
use shopping_etl::storage::{LocalObjectStore, ObjectPath, ObjectStore, read_csv_text, read_parquet};
use shopping_etl::transform::CleaningPlan;
use shopping_etl::warehouse::{JobStatus, LoadJobRequest, LocalWarehouse, Warehouse, WarehouseLoader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const HEADER: &str = "Customer ID,Age,Gender,Item Purchased,Category,Purchase Amount (USD),Location,Size,Color,Season,Review Rating,Subscription Status,Payment Method,Shipping Type,Discount Applied,Promo Code Used,Previous Purchases,Preferred Payment Method,Frequency of Purchases";

struct Fixture {
    temp: TempDir,
    staging: SqliteStore,
    objects: LocalObjectStore,
    table: TableRef,
    definition: TableDefinition,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        Self {
            staging: SqliteStore::new(temp.path().join("staging")),
            objects: LocalObjectStore::new(temp.path().join("objects")),
            table: TableRef::new("retail", "shopping_behavior").unwrap(),
            definition: TableDefinition::shopping_behavior(),
            temp,
        }
    }

    fn write_source(&self, rows: &[&str]) -> PathBuf {
        let path = self.temp.path().join("shopping.csv");
        let mut content = format!("{}\n", HEADER);
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn load(&self, source: &Path) -> Result<usize, StageError> {
        stages::load(&self.staging, &self.definition, source, &self.table).await
    }

    async fn row_count(&self) -> u64 {
        let mut conn = self.staging.connect().await.unwrap();
        conn.row_count(&self.table).await.unwrap()
    }
}

const ROW_A: &str = "1,55,Male,Blouse,Clothing,53,Kentucky,L,Gray,Winter,3.1,Yes,Credit Card,Express,Yes,Yes,14,Venmo,Fortnightly";
const ROW_B: &str = "2,19,Male,Sweater,Clothing,64,Maine,L,Maroon,Winter,,Yes,Bank Transfer,Express,Yes,Yes,2,Cash,Fortnightly";

#[tokio::test]
async fn test_load_then_extract_round_trip() {
    let fixture = Fixture::new();
    // Numeric-looking text in VARCHAR columns must come back as written
    let row_c = "3,41,Female,Jeans,Clothing,73,Ohio,08,Blue,Spring,4,No,Cash,Standard,No,1.50,1,Cash,Weekly";
    let row_d = "4,23,Male,Socks,Clothing,12,Iowa,10,Red,Fall,2.50,No,Cash,Standard,No,+1,7,Cash,Weekly";
    let source = fixture.write_source(&[ROW_A, ROW_B, row_c, row_d]);
    assert_eq!(fixture.load(&source).await.unwrap(), 4);

    let export = stages::extract(&fixture.staging, &fixture.objects, "bucket", &fixture.table)
        .await
        .unwrap();
    assert_eq!(export.to_string(), "bucket/retail_shopping_behavior.csv");

    let original = read_csv_text(&std::fs::read(&source).unwrap(), "source").unwrap();
    let exported = read_csv_text(&fixture.objects.get(&export).await.unwrap(), "export").unwrap();
    assert_eq!(exported.len(), original.len());

    // Compare every field under the declared column types
    for def in &fixture.definition.columns {
        let declared = def.sql_type.value_type();
        let raw_name = original
            .schema()
            .names()
            .find(|n| shopping_etl::dataset::sanitize_column_name(n) == def.name)
            .unwrap();
        for row in 0..original.len() {
            let before = original.get(row, raw_name).unwrap().coerce(declared);
            let after = exported.get(row, def.name).unwrap().coerce(declared);
            assert_eq!(before, after, "column {} row {}", def.name, row);
        }
    }

    let text = |row: usize, column: &str| exported.get(row, column).unwrap().to_string();
    assert_eq!(text(2, "Size"), "08");
    assert_eq!(text(3, "Size"), "10");
    assert_eq!(text(2, "Promo_Code_Used"), "1.50");
    assert_eq!(text(3, "Promo_Code_Used"), "+1");
    assert_eq!(text(2, "Review_Rating"), "4.0");
}

#[tokio::test]
async fn test_failed_insert_leaves_table_unchanged() {
    let fixture = Fixture::new();
    fixture.load(&fixture.write_source(&[ROW_A])).await.unwrap();
    assert_eq!(fixture.row_count().await, 1);

    // Third row has a non-numeric age
    let bad_row = "3,old,Female,Jeans,Clothing,73,Ohio,S,Blue,Spring,4.0,No,Cash,Standard,No,No,1,Cash,Weekly";
    let source = fixture.write_source(&[ROW_A, ROW_B, bad_row, ROW_B]);
    let err = fixture.load(&source).await.unwrap_err();

    assert!(matches!(err, StageError::InsertFailure { row: 2, .. }));
    assert_eq!(fixture.row_count().await, 1);
}

#[tokio::test]
async fn test_extract_missing_table() {
    let fixture = Fixture::new();
    let err = stages::extract(&fixture.staging, &fixture.objects, "bucket", &fixture.table)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TableNotFound");
}

#[tokio::test]
async fn test_dedup_runs_before_fillna() {
    let fixture = Fixture::new();
    // Identical except for the rating, which is null in the first row
    let unrated = "1,25,Female,Hat,Accessories,20,Texas,M,Red,Fall,,No,Cash,Standard,No,No,3,Cash,Monthly";
    let rated = "1,25,Female,Hat,Accessories,20,Texas,M,Red,Fall,4.0,No,Cash,Standard,No,No,3,Cash,Monthly";
    fixture.load(&fixture.write_source(&[unrated, rated])).await.unwrap();

    let export = stages::extract(&fixture.staging, &fixture.objects, "bucket", &fixture.table)
        .await
        .unwrap();
    let cleaned = ObjectPath::new("bucket", "cleaned_data.parquet");
    let written = stages::transform(&fixture.objects, &export, &CleaningPlan::default(), &cleaned)
        .await
        .unwrap();
    assert_eq!(written, 2);

    let bytes = fixture.objects.get(&cleaned).await.unwrap();
    let dataset = read_parquet(bytes.into()).unwrap();
    let ratings: Vec<_> = dataset.column("Review_Rating").unwrap().into_iter().cloned().collect();
    assert_eq!(ratings, vec![Value::Float(0.0), Value::Float(4.0)]);
}

#[tokio::test]
async fn test_transform_missing_source() {
    let fixture = Fixture::new();
    let err = stages::transform(
        &fixture.objects,
        &ObjectPath::new("bucket", "absent.csv"),
        &CleaningPlan::default(),
        &ObjectPath::new("bucket", "out.parquet"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "SourceUnreadable");
}

#[tokio::test]
async fn test_full_run_into_local_warehouse() {
    let fixture = Fixture::new();
    let source = fixture.write_source(&[ROW_A, ROW_B, ROW_A]);
    let warehouse = LocalWarehouse::new(fixture.objects.clone(), fixture.temp.path().join("warehouse"));
    let pipeline = Pipeline::new(
        &fixture.staging,
        &fixture.objects,
        WarehouseLoader::new(&warehouse).with_poll_interval(Duration::from_millis(5)),
        TableDefinition::shopping_behavior(),
    );
    let plan = RunPlan {
        source_path: source,
        table: fixture.table.clone(),
        bucket: "bucket".to_string(),
        cleaned_path: "gs://bucket/cleaned_data.parquet".parse().unwrap(),
        cleaning: CleaningPlan::default(),
        project_id: "project".to_string(),
        destination: "dataset.table".parse().unwrap(),
    };

    let summary = pipeline.run(&plan).await.unwrap();
    assert_eq!(summary.rows_loaded, 3);
    assert_eq!(summary.rows_cleaned, 2);

    let request = LoadJobRequest::new(plan.cleaned_path.clone(), "project", plan.destination.clone());
    let table = warehouse.read_table(&request).await.unwrap().unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.column("Review_Rating").unwrap().iter().all(|v| !v.is_null()));
}

#[tokio::test]
async fn test_run_stops_at_first_failed_stage() {
    let fixture = Fixture::new();
    let warehouse = LocalWarehouse::new(fixture.objects.clone(), fixture.temp.path().join("warehouse"));
    let pipeline = Pipeline::new(
        &fixture.staging,
        &fixture.objects,
        WarehouseLoader::new(&warehouse),
        TableDefinition::shopping_behavior(),
    );
    let plan = RunPlan {
        source_path: fixture.temp.path().join("missing.csv"),
        table: fixture.table.clone(),
        bucket: "bucket".to_string(),
        cleaned_path: "bucket/cleaned_data.parquet".parse().unwrap(),
        cleaning: CleaningPlan::default(),
        project_id: "project".to_string(),
        destination: "dataset.table".parse().unwrap(),
    };

    let err = pipeline.run(&plan).await.unwrap_err();
    assert_eq!(err.stage, Stage::Loader);
    assert_eq!(err.code(), "SourceUnreadable");

    // Nothing downstream ran
    let export = ObjectPath::staging_export("bucket", "retail", "shopping_behavior");
    assert!(fixture.objects.get(&export).await.is_err());
}

/// Warehouse whose every job ends in a failed state
struct FailingWarehouse;

impl Warehouse for FailingWarehouse {
    async fn submit_load(&self, _request: &LoadJobRequest) -> Result<String, StageError> {
        Ok("job-failing".to_string())
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatus, StageError> {
        Ok(JobStatus::Failed("Parquet schema does not match table".to_string()))
    }
}

#[tokio::test]
async fn test_failed_load_job_never_reports_success() {
    let loader = WarehouseLoader::new(&FailingWarehouse).with_poll_interval(Duration::from_millis(1));
    let err = stages::load_to_warehouse(
        &loader,
        &"bucket/cleaned_data.parquet".parse().unwrap(),
        "project",
        &"dataset.table".parse().unwrap(),
    )
    .await
    .unwrap_err();

    match err {
        StageError::LoadJobFailed { job_id, cause, .. } => {
            assert_eq!(job_id, "job-failing");
            assert_eq!(cause, LoadJobCause::Failed);
        }
        other => panic!("unexpected error: {other}"),
    }
}
