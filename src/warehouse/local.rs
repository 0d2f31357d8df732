//! Directory-backed warehouse
//!
//! Tables are Parquet files at `<root>/<project>/<dataset>/<table>.parquet`.
//! A load job runs to completion when it is submitted; its outcome is kept
//! in memory for [`Warehouse::job_status`].

use super::{JobStatus, LoadJobRequest, Warehouse};
use crate::dataset::Dataset;
use crate::error::{LoadJobCause, Result, StageError};
use crate::storage::{
    LocalObjectStore, ObjectPath, ObjectStore, PARQUET_CONTENT_TYPE, read_parquet, write_parquet,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Warehouse that appends Parquet objects from `S` to local table files
pub struct LocalWarehouse<S> {
    source: S,
    tables: LocalObjectStore,
    jobs: Mutex<HashMap<String, JobStatus>>,
    next_id: AtomicU64,
}

impl<S: ObjectStore> LocalWarehouse<S> {
    pub fn new(source: S, root: impl AsRef<Path>) -> Self {
        Self {
            source,
            tables: LocalObjectStore::new(root),
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Location of a destination table
    pub fn table_path(&self, request: &LoadJobRequest) -> ObjectPath {
        ObjectPath::new(
            request.project_id.as_str(),
            format!(
                "{}/{}.parquet",
                request.destination.dataset, request.destination.table
            ),
        )
    }

    /// Read a destination table, if it exists
    pub async fn read_table(&self, request: &LoadJobRequest) -> Result<Option<Dataset>> {
        let path = self.table_path(request);
        if !self.tables.file_path(&path).exists() {
            return Ok(None);
        }
        let bytes = self.tables.get(&path).await?;
        read_parquet(Bytes::from(bytes))
            .map(Some)
            .map_err(|e| StageError::source_unreadable(&path, e))
    }

    /// Run the job, returning the terminal status
    async fn run_job(&self, request: &LoadJobRequest) -> JobStatus {
        let incoming = match self.source.get(&request.source).await {
            Ok(bytes) => match read_parquet(Bytes::from(bytes)) {
                Ok(dataset) => dataset,
                Err(e) => return JobStatus::Failed(format!("{}: {}", request.source.uri(), e)),
            },
            Err(e) => return JobStatus::Failed(e.to_string()),
        };

        let combined = match self.read_table(request).await {
            Ok(None) => incoming,
            Ok(Some(existing)) => {
                if existing.schema() != incoming.schema() {
                    return JobStatus::Failed(format!(
                        "schema of {} does not match table {}",
                        request.source.uri(),
                        request.destination
                    ));
                }
                let schema = existing.schema().clone();
                let mut records = existing.into_records();
                records.extend(incoming.into_records());
                match Dataset::new(schema, records) {
                    Ok(dataset) => dataset,
                    Err(e) => return JobStatus::Failed(e.to_string()),
                }
            }
            Err(e) => return JobStatus::Failed(e.to_string()),
        };

        let path = self.table_path(request);
        let bytes = match write_parquet(&combined) {
            Ok(bytes) => bytes,
            Err(e) => return JobStatus::Failed(e.to_string()),
        };
        match self.tables.put(&path, bytes, PARQUET_CONTENT_TYPE).await {
            Ok(()) => {
                log::debug!("Table {} now has {} rows", request.destination, combined.len());
                JobStatus::Complete
            }
            Err(e) => JobStatus::Failed(e.to_string()),
        }
    }
}

impl<S: ObjectStore> Warehouse for LocalWarehouse<S> {
    async fn submit_load(&self, request: &LoadJobRequest) -> Result<String> {
        let job_id = format!("local-job-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let status = self.run_job(request).await;
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone(), status);
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
            .ok_or_else(|| StageError::load_job(job_id, LoadJobCause::Failed, "unknown job"))
    }
}
