//! Run configuration from environment variables
//!
//! Every setting has a documented default so a bare environment still
//! describes a complete run. Values are parsed and validated once, before any
//! stage starts.

use crate::client::Auth;
use crate::dataset::TableRef;
use crate::storage::ObjectPath;
use crate::transform::CleaningPlan;
use crate::warehouse::Destination;
use clap::ValueEnum;
use eyre::{Context, Result, bail, eyre};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CLEAN_OPERATIONS: &str =
    r#"{"drop_duplicates": true, "fillna": {"Review_Rating": 0}}"#;

/// Relational store holding the staging table
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StagingBackend {
    Postgres,
    Sqlite,
}

/// Store holding the CSV export and the cleaned Parquet file
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Gcs,
    Local,
}

/// Warehouse receiving the load job
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WarehouseBackend {
    Bigquery,
    Local,
}

fn parse_backend<T: ValueEnum>(key: &str, value: &str) -> Result<T> {
    T::from_str(value, true).map_err(|_| eyre!("Invalid {}: '{}'", key, value))
}

/// PostgreSQL connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub csv_file_path: PathBuf,
    pub table: TableRef,

    pub staging_backend: StagingBackend,
    pub postgres: PostgresSettings,
    pub sqlite_dir: PathBuf,

    pub storage_backend: StorageBackend,
    pub bucket: String,
    pub cleaned_path: ObjectPath,
    pub local_data_dir: PathBuf,
    pub gcs_endpoint: String,
    pub auth: Auth,

    pub cleaning: CleaningPlan,

    pub warehouse_backend: WarehouseBackend,
    pub project_id: String,
    pub destination: Destination,
    pub bigquery_endpoint: String,
    pub bigquery_location: Option<String>,
    pub local_warehouse_dir: PathBuf,
    pub load_job_timeout: Duration,
    pub load_job_poll_interval: Duration,

    pub retries: u32,
    pub retry_delay: Duration,
}

impl RunConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which returns the raw value
    /// of a variable if it is set
    ///
    /// # Errors
    /// Returns an error naming the first variable that is malformed or fails
    /// validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let parse = |key: &str, default: &str| -> Result<u64> {
            let raw = get(key, default);
            raw.trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}' is not a number", key, raw))
        };

        let schema = get("DB_SCHEMA", "default_schema");
        let table_name = get("DB_TABLE", "default_table");
        let table = TableRef::new(schema.as_str(), table_name.as_str())
            .with_context(|| format!("Invalid DB_SCHEMA/DB_TABLE '{}.{}'", schema, table_name))?;

        let port = parse("DB_PORT", "5432")?;
        let postgres = PostgresSettings {
            host: get("DB_HOST", "default-host"),
            port: u16::try_from(port).with_context(|| format!("Invalid DB_PORT: {}", port))?,
            dbname: get("DB_NAME", "airflow"),
            user: get("DB_USER", "airflow"),
            password: get("DB_PASSWORD", "airflow"),
        };

        let bucket = get("GCS_BUCKET_NAME", "default-bucket");
        if bucket.contains('/') {
            bail!("Invalid GCS_BUCKET_NAME: '{}' contains '/'", bucket);
        }
        let cleaned = get("GCS_CLEANED_PATH", "gs://default-bucket/cleaned_data.parquet");
        let cleaned_path = ObjectPath::from_str(&cleaned)
            .map_err(|e| eyre!(e))
            .context("Invalid GCS_CLEANED_PATH")?;

        let cleaning = match lookup("CLEAN_OPERATIONS_FILE").filter(|v| !v.trim().is_empty()) {
            Some(file) => CleaningPlan::from_file(&file).context("Invalid CLEAN_OPERATIONS_FILE")?,
            None => CleaningPlan::from_json_str(&get("CLEAN_OPERATIONS", DEFAULT_CLEAN_OPERATIONS))
                .context("Invalid CLEAN_OPERATIONS")?,
        };

        let project_id = get("GCP_PROJECT_ID", "default-project-id");
        let destination = Destination::from_str(&get("BIGQUERY_DEST_TABLE", "default_dataset.default_table"))
            .map_err(|e| eyre!(e))
            .context("Invalid BIGQUERY_DEST_TABLE")?;

        let poll_millis = parse("LOAD_JOB_POLL_MILLIS", "1000")?;
        if poll_millis == 0 {
            bail!("Invalid LOAD_JOB_POLL_MILLIS: must be positive");
        }
        let retries = parse("RUN_RETRIES", "1")?;

        Ok(Self {
            csv_file_path: PathBuf::from(get("CSV_FILE_PATH", "/opt/airflow/data/default.csv")),
            table,
            staging_backend: parse_backend("STAGING_BACKEND", &get("STAGING_BACKEND", "postgres"))?,
            postgres,
            sqlite_dir: PathBuf::from(get("SQLITE_DIR", "./staging")),
            storage_backend: parse_backend("STORAGE_BACKEND", &get("STORAGE_BACKEND", "gcs"))?,
            bucket,
            cleaned_path,
            local_data_dir: PathBuf::from(get("LOCAL_DATA_DIR", "./data")),
            gcs_endpoint: get("GCS_ENDPOINT", crate::storage::GCS_ENDPOINT),
            auth: Auth::new(lookup("GCP_ACCESS_TOKEN")),
            cleaning,
            warehouse_backend: parse_backend("WAREHOUSE_BACKEND", &get("WAREHOUSE_BACKEND", "bigquery"))?,
            project_id,
            destination,
            bigquery_endpoint: get("BIGQUERY_ENDPOINT", crate::warehouse::BIGQUERY_ENDPOINT),
            bigquery_location: lookup("BIGQUERY_LOCATION").filter(|v| !v.trim().is_empty()),
            local_warehouse_dir: PathBuf::from(get("LOCAL_WAREHOUSE_DIR", "./warehouse")),
            load_job_timeout: Duration::from_secs(parse("LOAD_JOB_TIMEOUT_SECS", "600")?),
            load_job_poll_interval: Duration::from_millis(poll_millis),
            retries: u32::try_from(retries).with_context(|| format!("Invalid RUN_RETRIES: {}", retries))?,
            retry_delay: Duration::from_secs(parse("RUN_RETRY_DELAY_SECS", "60")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RunConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.csv_file_path, PathBuf::from("/opt/airflow/data/default.csv"));
        assert_eq!(config.table.to_string(), "default_schema.default_table");
        assert_eq!(config.staging_backend, StagingBackend::Postgres);
        assert_eq!(config.postgres.host, "default-host");
        assert_eq!(config.postgres.port, 5432);
        assert_eq!(config.postgres.user, "airflow");
        assert_eq!(config.bucket, "default-bucket");
        assert_eq!(config.cleaned_path.to_string(), "default-bucket/cleaned_data.parquet");
        assert_eq!(config.cleaning, CleaningPlan::default());
        assert_eq!(config.project_id, "default-project-id");
        assert_eq!(config.destination.to_string(), "default_dataset.default_table");
        assert_eq!(config.load_job_timeout, Duration::from_secs(600));
        assert_eq!(config.retries, 1);
        assert_eq!(config.retry_delay, Duration::from_secs(60));
        assert!(matches!(config.auth, Auth::None));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("STAGING_BACKEND", "SQLite"),
            ("STORAGE_BACKEND", "local"),
            ("WAREHOUSE_BACKEND", "local"),
            ("DB_SCHEMA", "retail"),
            ("DB_PORT", "6543"),
            ("CLEAN_OPERATIONS", r#"{"drop_duplicates": false}"#),
            ("LOAD_JOB_POLL_MILLIS", "250"),
            ("GCP_ACCESS_TOKEN", "  "),
        ])
        .unwrap();
        assert_eq!(config.staging_backend, StagingBackend::Sqlite);
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.warehouse_backend, WarehouseBackend::Local);
        assert_eq!(config.table.schema(), "retail");
        assert_eq!(config.postgres.port, 6543);
        assert!(config.cleaning.is_empty());
        assert_eq!(config.load_job_poll_interval, Duration::from_millis(250));
        assert!(matches!(config.auth, Auth::None));
    }

    #[test]
    fn test_validation_errors() {
        assert!(config(&[("DB_TABLE", "bad table")]).is_err());
        assert!(config(&[("DB_PORT", "70000")]).is_err());
        assert!(config(&[("BIGQUERY_DEST_TABLE", "no_dataset")]).is_err());
        assert!(config(&[("GCS_CLEANED_PATH", "gs://bucket-only")]).is_err());
        assert!(config(&[("LOAD_JOB_POLL_MILLIS", "0")]).is_err());
        assert!(config(&[("STAGING_BACKEND", "oracle")]).is_err());
        assert!(config(&[("CLEAN_OPERATIONS", "[]")]).is_err());

        let err = config(&[("RUN_RETRIES", "twice")]).unwrap_err();
        assert!(format!("{:#}", err).contains("RUN_RETRIES"));
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let config = config(&[("DB_PASSWORD", "hunter2"), ("GCP_ACCESS_TOKEN", "ya29.secret")]).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("ya29.secret"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // SAFETY: serialized with every other environment-mutating test
        unsafe {
            std::env::set_var("DB_TABLE", "from_env_table");
        }
        let config = RunConfig::from_env().unwrap();
        unsafe {
            std::env::remove_var("DB_TABLE");
        }
        assert_eq!(config.table.table(), "from_env_table");
    }
}
