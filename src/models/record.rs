use crate::error::{ErrorClassification, JobError};
use crate::models::{ProgressRecord, Update};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category attached to every error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    NotSpecified,
    ResourceUnavailable,
    ProtocolError,
    ConnectionError,
    InvalidOperation,
    ObjectNotFound,
    OperationStopped,
}

/// Structured error entry appended to a job's Error stream or written to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_id: String,
    pub classification: ErrorClassification,
    pub category: ErrorCategory,
    pub code: Option<u32>,
    pub message: String,
    pub recommended_action: Option<String>,
    pub target: Option<String>,
}

impl ErrorRecord {
    /// Build a record for a numeric engine failure code.
    pub fn for_code(code: u32, target: Option<&str>) -> Self {
        let classification = ErrorClassification::from_code(code);
        Self {
            error_id: classification.error_id(code),
            classification,
            category: classification.category(),
            code: Some(code),
            message: classification.describe(code),
            recommended_action: classification.recommended_action().map(str::to_string),
            target: target.map(str::to_string),
        }
    }

    /// Error written for an update that must be downloaded first but downloads are disabled.
    pub fn not_downloaded(update: &Update) -> Self {
        Self {
            error_id: "UpdateNotDownloaded".to_string(),
            classification: ErrorClassification::NotDownloaded,
            category: ErrorCategory::InvalidOperation,
            code: None,
            message: format!("The update '{}' has not been downloaded.", update.title),
            recommended_action: Some(
                "Download the update first, or allow downloading before install.".to_string(),
            ),
            target: Some(update.title.clone()),
        }
    }

    /// Map a job failure into the record stored in the job's Error stream.
    pub fn from_job_error(error: &JobError, target: Option<&str>) -> Self {
        if let Some(code) = error.code() {
            let mut record = Self::for_code(code, target);
            record.message = format!("{}: {}", record.message, error);
            return record;
        }

        let (error_id, category) = match error {
            JobError::Cancelled | JobError::Aborted => {
                ("OperationStopped", ErrorCategory::OperationStopped)
            }
            JobError::Host(_) => ("HostCallFailed", ErrorCategory::InvalidOperation),
            JobError::InvalidState { .. } => ("InvalidJobState", ErrorCategory::InvalidOperation),
            JobError::Child { source, .. } => return Self::from_job_error(source, target),
            _ => ("JobFailure", ErrorCategory::NotSpecified),
        };

        Self {
            error_id: error_id.to_string(),
            classification: ErrorClassification::Unexpected,
            category,
            code: None,
            message: error.to_string(),
            recommended_action: None,
            target: target.map(str::to_string),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "[{}] {} ({})", self.error_id, self.message, target),
            None => write!(f, "[{}] {}", self.error_id, self.message),
        }
    }
}

/// One value travelling toward the host, tagged by destination stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem<T> {
    Output(T),
    Progress(ProgressRecord),
    Error(ErrorRecord),
    Verbose(String),
    Debug(String),
}

impl<T> StreamItem<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
