// Error types for the orchestration core
//
// Library errors are thiserror enums; the configuration and logging edges use
// anyhow. Engine failures carry a numeric code that ErrorClassification maps to
// an error id, a category and (for well-known codes) a recommended action.

use crate::jobs::JobState;
use crate::models::ErrorCategory;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure raised by a capability seam call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine call failed with 0x{code:08X}: {message}")]
    Call { code: u32, message: String },

    #[error("engine dropped the completion callback without invoking it")]
    CompletionDropped,
}

impl EngineError {
    pub fn call(code: u32, message: impl Into<String>) -> Self {
        Self::Call {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Call { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Fault from a host interaction marshalled through the pump.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host call failed: {0}")]
    Call(String),

    #[error("work channel is closed")]
    ChannelClosed,

    #[error("pump stopped before the work item ran")]
    Abandoned,
}

/// Failure that ends a pump run.
#[derive(Error, Debug)]
pub enum PumpError {
    /// The lifecycle future returned an error; it is rethrown on the host thread.
    #[error("pumped work faulted: {0:#}")]
    Faulted(anyhow::Error),

    #[error("lifecycle task panicked: {0}")]
    Panicked(String),
}

/// Failure of a job's work function.
#[derive(Error, Debug)]
pub enum JobError {
    /// The job's own cancellation token fired.
    #[error("operation was cancelled")]
    Cancelled,

    /// The engine acknowledged an abort and reported the batch as aborted.
    #[error("engine aborted the operation")]
    Aborted,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("batch operation failed with 0x{hresult:08X}")]
    BatchFailed { hresult: u32 },

    /// A child job failed; its error was already recorded in the child's own stream.
    #[error("child job '{name}' failed: {source}")]
    Child {
        name: String,
        #[source]
        source: Box<JobError>,
    },

    #[error("job '{name}' cannot {action} while {state}")]
    InvalidState {
        name: String,
        action: &'static str,
        state: JobState,
    },

    #[error("job task panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Cancellation and engine aborts resolve to `Stopped`, never `Failed`.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Aborted)
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Engine(e) => e.code(),
            Self::BatchFailed { hresult } => Some(*hresult),
            Self::Child { source, .. } => source.code(),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job {0} is not registered")]
    NotFound(Uuid),

    #[error("job {id} is still {state} and cannot be removed")]
    StillRunning { id: Uuid, state: JobState },
}

/// Classification derived from an engine failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClassification {
    ServerPolicyValueMissing,
    SourceNotFound,
    NotInitialized,
    LegacyServer,
    AllDownloadsFailed,
    NotDownloaded,
    Unexpected,
}

impl ErrorClassification {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x80244011 => Self::ServerPolicyValueMissing,
            0x80240438 => Self::SourceNotFound,
            0x80240004 => Self::NotInitialized,
            0x802B0002 => Self::LegacyServer,
            0x80240022 => Self::AllDownloadsFailed,
            _ => Self::Unexpected,
        }
    }

    pub fn error_id(self, code: u32) -> String {
        match self {
            Self::ServerPolicyValueMissing => "WUServerPolicyValueMissing".to_string(),
            Self::SourceNotFound => "WindowsUpdateSourceNotFound".to_string(),
            Self::NotInitialized => "WindowsUpdateNotInitialized".to_string(),
            Self::LegacyServer => "WindowsUpdateServerLegacy".to_string(),
            Self::AllDownloadsFailed => "WindowsUpdateAllDownloadsFailed".to_string(),
            Self::NotDownloaded => "UpdateNotDownloaded".to_string(),
            Self::Unexpected => format!("WindowsUpdate.0x{:08X}", code),
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ServerPolicyValueMissing | Self::SourceNotFound | Self::AllDownloadsFailed => {
                ErrorCategory::ResourceUnavailable
            }
            Self::NotInitialized => ErrorCategory::ProtocolError,
            Self::LegacyServer => ErrorCategory::ConnectionError,
            Self::NotDownloaded => ErrorCategory::InvalidOperation,
            Self::Unexpected => ErrorCategory::NotSpecified,
        }
    }

    pub fn describe(self, code: u32) -> String {
        match self {
            Self::ServerPolicyValueMissing => {
                "The Windows Update server policy value is missing in the registry.".to_string()
            }
            Self::SourceNotFound => "The Windows Update source was not found.".to_string(),
            Self::NotInitialized => {
                "A component of the update agent has not been initialized correctly.".to_string()
            }
            Self::LegacyServer => "The update server only supports a legacy protocol.".to_string(),
            Self::AllDownloadsFailed => "All downloads failed.".to_string(),
            Self::NotDownloaded => "The update has not been downloaded.".to_string(),
            Self::Unexpected => format!("The operation failed with 0x{:08X}.", code),
        }
    }

    pub fn recommended_action(self) -> Option<&'static str> {
        match self {
            Self::ServerPolicyValueMissing => {
                Some("Use the 'WindowsUpdate' or 'Default' server selection.")
            }
            Self::SourceNotFound | Self::AllDownloadsFailed => {
                Some("Check the network connection and try again.")
            }
            Self::NotInitialized => {
                Some("Repeat the operation; if it keeps failing, restart the update service.")
            }
            Self::LegacyServer => Some("Select a server that supports the current protocol."),
            Self::NotDownloaded | Self::Unexpected => None,
        }
    }
}
