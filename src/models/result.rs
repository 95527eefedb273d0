use crate::models::Update;
use serde::{Deserialize, Serialize};

/// Terminal (or in-flight) result code reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationResultCode {
    NotStarted,
    InProgress,
    Succeeded,
    SucceededWithErrors,
    Failed,
    Aborted,
}

impl OperationResultCode {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::SucceededWithErrors)
    }

    /// Combine per-item outcomes into a batch code.
    ///
    /// An aborted run is `Aborted` regardless of what finished before the
    /// abort; otherwise a batch is only `Succeeded` when nothing failed.
    pub fn aggregate(succeeded: usize, failed: usize, aborted: bool) -> Self {
        if aborted {
            Self::Aborted
        } else if failed == 0 {
            Self::Succeeded
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::SucceededWithErrors
        }
    }
}

/// Result for a single item inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub code: OperationResultCode,
    pub hresult: u32,
}

impl OperationResult {
    pub fn succeeded() -> Self {
        Self {
            code: OperationResultCode::Succeeded,
            hresult: 0,
        }
    }

    pub fn failed(hresult: u32) -> Self {
        Self {
            code: OperationResultCode::Failed,
            hresult,
        }
    }

    pub fn aborted() -> Self {
        Self {
            code: OperationResultCode::Aborted,
            hresult: 0,
        }
    }
}

/// Result of a download or install batch, as returned by the matching `end` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub code: OperationResultCode,
    pub hresult: u32,
    pub item_results: Vec<OperationResult>,
}

impl BatchResult {
    pub fn item(&self, index: usize) -> Option<&OperationResult> {
        self.item_results.get(index)
    }
}

/// Non-fatal condition reported alongside search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineWarning {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub code: OperationResultCode,
    pub hresult: u32,
    pub updates: Vec<Update>,
    pub warnings: Vec<EngineWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_never_hides_failures() {
        assert_eq!(
            OperationResultCode::aggregate(3, 0, false),
            OperationResultCode::Succeeded
        );
        assert_eq!(
            OperationResultCode::aggregate(1, 1, false),
            OperationResultCode::SucceededWithErrors
        );
        assert_eq!(
            OperationResultCode::aggregate(0, 2, false),
            OperationResultCode::Failed
        );
        assert_eq!(
            OperationResultCode::aggregate(2, 1, true),
            OperationResultCode::Aborted
        );
    }

    #[test]
    fn test_empty_batch_is_success() {
        assert_eq!(
            OperationResultCode::aggregate(0, 0, false),
            OperationResultCode::Succeeded
        );
    }
}
