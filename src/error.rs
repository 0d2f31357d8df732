//! Stage error taxonomy
//!
//! Every stage reports exactly one [`StageError`] to its caller. The run
//! orchestrator wraps it in a [`RunError`] naming the stage that failed.

use std::fmt;
use thiserror::Error;

/// Why a warehouse load job did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadJobCause {
    /// The warehouse reported the job as failed
    Failed,
    /// The warehouse reported the job as cancelled
    Cancelled,
    /// The warehouse rejected the job at submission
    Rejected,
    /// The local wait exceeded the configured timeout
    TimedOut,
    /// The local wait was aborted by an external cancellation signal
    Aborted,
}

impl fmt::Display for LoadJobCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed out",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("source unreadable: {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("insert failure at row {row}: {reason}")]
    InsertFailure { row: usize, reason: String },

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("write failure: {path}: {reason}")]
    WriteFailure { path: String, reason: String },

    #[error("load job {job_id} {cause}: {detail}")]
    LoadJobFailed {
        job_id: String,
        cause: LoadJobCause,
        detail: String,
    },
}

impl StageError {
    pub fn source_unreadable(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::SourceUnreadable {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write_failure(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::WriteFailure {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn connection(reason: impl fmt::Display) -> Self {
        Self::ConnectionFailure(reason.to_string())
    }

    pub fn load_job(job_id: impl Into<String>, cause: LoadJobCause, detail: impl Into<String>) -> Self {
        Self::LoadJobFailed {
            job_id: job_id.into(),
            cause,
            detail: detail.into(),
        }
    }

    /// Stable taxonomy code reported to users
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnreadable { .. } => "SourceUnreadable",
            Self::SchemaConflict(_) => "SchemaConflict",
            Self::ConnectionFailure(_) => "ConnectionFailure",
            Self::InsertFailure { .. } => "InsertFailure",
            Self::TableNotFound(_) => "TableNotFound",
            Self::WriteFailure { .. } => "WriteFailure",
            Self::LoadJobFailed { .. } => "LoadJobFailed",
        }
    }
}

pub type Result<T> = std::result::Result<T, StageError>;

/// The four pipeline stages, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loader,
    Extractor,
    Transformer,
    WarehouseLoader,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loader => "loader",
            Self::Extractor => "extractor",
            Self::Transformer => "transformer",
            Self::WarehouseLoader => "warehouse-loader",
        };
        f.write_str(s)
    }
}

/// A failed run: which stage failed and why
#[derive(Error, Debug)]
#[error("stage {stage} failed [{code}]: {error}", code = .error.code())]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub error: StageError,
}

impl RunError {
    pub fn new(stage: Stage, error: StageError) -> Self {
        Self { stage, error }
    }

    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

/// Attach a stage to a stage result
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, RunError>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, RunError> {
        self.map_err(|error| RunError::new(stage, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StageError::SchemaConflict("x".into()).code(), "SchemaConflict");
        assert_eq!(StageError::TableNotFound("s.t".into()).code(), "TableNotFound");
        assert_eq!(
            StageError::load_job("job-1", LoadJobCause::TimedOut, "600s").code(),
            "LoadJobFailed"
        );
    }

    #[test]
    fn test_run_error_names_stage_and_code() {
        let err: std::result::Result<(), StageError> =
            Err(StageError::InsertFailure { row: 3, reason: "bad age".into() });
        let run_err = err.stage(Stage::Loader).unwrap_err();
        let message = run_err.to_string();
        assert!(message.contains("loader"));
        assert!(message.contains("InsertFailure"));
        assert!(message.contains("row 3"));
    }

    #[test]
    fn test_load_job_message_has_cause() {
        let err = StageError::load_job("job-7", LoadJobCause::Cancelled, "user cancelled");
        assert_eq!(err.to_string(), "load job job-7 cancelled: user cancelled");
    }
}
