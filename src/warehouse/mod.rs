//! Analytical warehouse load jobs
//!
//! A load job ingests a Parquet object into a warehouse table. The
//! warehouse runs it asynchronously; [`WarehouseLoader`] submits the job and
//! polls it until it reaches a terminal state, the local wait times out, or
//! an external cancellation token fires.

mod bigquery;
mod local;

pub use bigquery::{BIGQUERY_ENDPOINT, BigQueryWarehouse};
pub use local::LocalWarehouse;

use crate::error::{LoadJobCause, Result, StageError};
use crate::storage::{AnyObjectStore, ObjectPath};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// State of a submitted load job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed(String),
    Cancelled(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Complete => f.write_str("complete"),
            Self::Failed(detail) => write!(f, "failed: {}", detail),
            Self::Cancelled(detail) => write!(f, "cancelled: {}", detail),
        }
    }
}

/// Destination table within a project, written `dataset.table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub dataset: String,
    pub table: String,
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [dataset, table] if !dataset.is_empty() && !table.is_empty() => Ok(Self {
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => Err(format!("'{}' is not of the form dataset.table", s)),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// A Parquet object to append to a warehouse table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJobRequest {
    pub source: ObjectPath,
    pub project_id: String,
    pub destination: Destination,
}

impl LoadJobRequest {
    pub fn new(source: ObjectPath, project_id: impl Into<String>, destination: Destination) -> Self {
        Self {
            source,
            project_id: project_id.into(),
            destination,
        }
    }
}

impl fmt::Display for LoadJobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}.{}", self.source.uri(), self.project_id, self.destination)
    }
}

/// Warehouse that runs asynchronous load jobs
pub trait Warehouse: Send + Sync {
    /// Submit a Parquet load job and return its id
    ///
    /// # Errors
    /// `ConnectionFailure` if the warehouse cannot be reached,
    /// `LoadJobFailed` with cause `Rejected` if it refuses the job
    fn submit_load(&self, request: &LoadJobRequest) -> impl Future<Output = Result<String>> + Send;

    /// Current state of a submitted job
    fn job_status(&self, job_id: &str) -> impl Future<Output = Result<JobStatus>> + Send;
}

/// Submits a load job and blocks until it is terminal
pub struct WarehouseLoader<'a, W> {
    warehouse: &'a W,
    poll_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<'a, W: Warehouse> WarehouseLoader<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self {
            warehouse,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort the wait when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run one load job to completion, returning the job id
    ///
    /// # Errors
    /// `LoadJobFailed` if the job fails, is cancelled, is rejected, outlives
    /// the timeout, or the wait is aborted; `ConnectionFailure` if the
    /// warehouse cannot be reached
    pub async fn load(&self, request: &LoadJobRequest) -> Result<String> {
        let job_id = self.warehouse.submit_load(request).await?;
        log::info!("Submitted load job {} ({})", job_id, request);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StageError::load_job(
                job_id.as_str(),
                LoadJobCause::Aborted,
                "wait aborted before the job finished",
            )),
            waited = tokio::time::timeout(self.timeout, self.wait(&job_id)) => match waited {
                Ok(result) => result.map(|()| job_id.clone()),
                Err(_) => Err(StageError::load_job(
                    job_id.as_str(),
                    LoadJobCause::TimedOut,
                    format!("no terminal state after {}s", self.timeout.as_secs_f64()),
                )),
            },
        }
    }

    async fn wait(&self, job_id: &str) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.warehouse.job_status(job_id).await? {
                JobStatus::Complete => {
                    log::info!("Load job {} complete", job_id);
                    return Ok(());
                }
                JobStatus::Failed(detail) => {
                    return Err(StageError::load_job(job_id, LoadJobCause::Failed, detail));
                }
                JobStatus::Cancelled(detail) => {
                    return Err(StageError::load_job(job_id, LoadJobCause::Cancelled, detail));
                }
                status => log::debug!("Load job {} is {}", job_id, status),
            }
        }
    }
}

/// Warehouse selected at run time
pub enum AnyWarehouse {
    BigQuery(BigQueryWarehouse),
    Local(LocalWarehouse<AnyObjectStore>),
}

impl Warehouse for AnyWarehouse {
    async fn submit_load(&self, request: &LoadJobRequest) -> Result<String> {
        match self {
            Self::BigQuery(warehouse) => warehouse.submit_load(request).await,
            Self::Local(warehouse) => warehouse.submit_load(request).await,
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        match self {
            Self::BigQuery(warehouse) => warehouse.job_status(job_id).await,
            Self::Local(warehouse) => warehouse.job_status(job_id).await,
        }
    }
}
