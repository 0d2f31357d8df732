//! BigQuery load jobs (REST API v2)

use super::{JobStatus, LoadJobRequest, Warehouse};
use crate::client::GoogleClient;
use crate::error::{LoadJobCause, Result, StageError};
use serde::Deserialize;
use serde_json::json;

pub const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: Option<JobReference>,
    status: Option<JobState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobState {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Job id in BigQuery's qualified form, `project:location.job`
///
/// Domain-scoped projects (`example.com:proj`) contain a colon themselves,
/// so the location and job are split off from the right. Locations and job
/// ids never contain `:` or `.`.
#[derive(Debug, PartialEq, Eq)]
struct QualifiedJobId<'a> {
    project: &'a str,
    location: Option<&'a str>,
    job: &'a str,
}

impl<'a> QualifiedJobId<'a> {
    fn parse(id: &'a str) -> Option<Self> {
        let (project, rest) = id.rsplit_once(':')?;
        let (location, job) = match rest.split_once('.') {
            Some((location, job)) => (Some(location), job),
            None => (None, rest),
        };
        (!project.is_empty() && !job.is_empty()).then_some(Self {
            project,
            location,
            job,
        })
    }

    fn format(reference: &JobReference) -> String {
        match &reference.location {
            Some(location) => format!("{}:{}.{}", reference.project_id, location, reference.job_id),
            None => format!("{}:{}", reference.project_id, reference.job_id),
        }
    }
}

/// Warehouse backed by the BigQuery jobs API
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: GoogleClient,
    location: Option<String>,
}

impl BigQueryWarehouse {
    pub fn new(client: GoogleClient) -> Self {
        Self {
            client,
            location: None,
        }
    }

    /// Run jobs in a specific location (e.g. `US`, `europe-west1`)
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn load_configuration(&self, request: &LoadJobRequest) -> serde_json::Value {
        let mut body = json!({
            "configuration": {
                "load": {
                    "sourceUris": [request.source.uri()],
                    "sourceFormat": "PARQUET",
                    "writeDisposition": "WRITE_APPEND",
                    "destinationTable": {
                        "projectId": request.project_id,
                        "datasetId": request.destination.dataset,
                        "tableId": request.destination.table,
                    },
                },
            },
        });
        if let Some(location) = &self.location {
            body["jobReference"] = json!({ "location": location });
        }
        body
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn status_of(state: &JobState) -> JobStatus {
    match state.state.as_str() {
        "PENDING" => JobStatus::Pending,
        "RUNNING" => JobStatus::Running,
        _ => match &state.error_result {
            None => JobStatus::Complete,
            Some(error) => {
                let detail = error
                    .message
                    .clone()
                    .or_else(|| error.reason.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                if error.reason.as_deref() == Some("stopped") {
                    JobStatus::Cancelled(detail)
                } else {
                    JobStatus::Failed(detail)
                }
            }
        },
    }
}

impl Warehouse for BigQueryWarehouse {
    async fn submit_load(&self, request: &LoadJobRequest) -> Result<String> {
        let body = self.load_configuration(request);
        log::debug!("Load job configuration: {}", body);

        let response = self
            .client
            .post_json_value(&["bigquery", "v2", "projects", request.project_id.as_str(), "jobs"], &body)
            .await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StageError::connection(format!("reading job response: {}", e)))?;

        if !status.is_success() {
            return Err(StageError::load_job(
                "(not created)",
                LoadJobCause::Rejected,
                format!("{}: {}", status, error_message(&text)),
            ));
        }

        let job: Job = serde_json::from_str(&text).map_err(|e| {
            StageError::load_job("(unknown)", LoadJobCause::Rejected, format!("unexpected response: {}", e))
        })?;
        let reference = job.job_reference.ok_or_else(|| {
            StageError::load_job("(unknown)", LoadJobCause::Rejected, "response has no jobReference")
        })?;
        Ok(QualifiedJobId::format(&reference))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let id = QualifiedJobId::parse(job_id).ok_or_else(|| {
            StageError::load_job(job_id, LoadJobCause::Failed, "malformed job id")
        })?;
        let query = id.location.map(|l| vec![("location", l)]).unwrap_or_default();

        let response = self
            .client
            .get(&["bigquery", "v2", "projects", id.project, "jobs", id.job], &query)
            .await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StageError::connection(format!("reading job status: {}", e)))?;
        if !status.is_success() {
            return Err(StageError::connection(format!(
                "job status {}: {}: {}",
                job_id,
                status,
                error_message(&text)
            )));
        }

        let job: Job = serde_json::from_str(&text)
            .map_err(|e| StageError::connection(format!("unexpected job status response: {}", e)))?;
        Ok(job.status.as_ref().map(status_of).unwrap_or(JobStatus::Pending))
    }
}
