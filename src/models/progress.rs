// Progress snapshots produced by engine callbacks and the records built from them

use crate::models::OperationResult;
use serde::{Deserialize, Serialize};

/// Phase of the item currently being downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadPhase {
    Initializing,
    Downloading,
    Verifying,
}

/// Snapshot passed to a download progress callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Overall batch percent, 0-100.
    pub percent_complete: i32,
    pub current_item_index: usize,
    pub current_item_percent_complete: i32,
    pub current_item_phase: DownloadPhase,
    pub current_item_bytes_downloaded: u64,
    pub current_item_bytes_to_download: u64,
    pub total_bytes_downloaded: u64,
    pub total_bytes_to_download: u64,
    /// Populated by the engine once the current item reaches 100%.
    pub current_item_result: Option<OperationResult>,
}

/// Snapshot passed to an install progress callback. No byte counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub percent_complete: i32,
    pub current_item_index: usize,
    pub current_item_percent_complete: i32,
    pub current_item_result: Option<OperationResult>,
}

/// Common view over per-item progress snapshots.
///
/// The orchestrator drives per-item completion detection through this trait so
/// download and install share one tracker.
pub trait ItemProgress {
    fn percent_complete(&self) -> i32;
    fn current_item_index(&self) -> usize;
    fn current_item_percent(&self) -> i32;
    fn current_item_result(&self) -> Option<OperationResult>;
}

impl ItemProgress for DownloadProgress {
    fn percent_complete(&self) -> i32 {
        self.percent_complete
    }

    fn current_item_index(&self) -> usize {
        self.current_item_index
    }

    fn current_item_percent(&self) -> i32 {
        self.current_item_percent_complete
    }

    fn current_item_result(&self) -> Option<OperationResult> {
        self.current_item_result
    }
}

impl ItemProgress for InstallProgress {
    fn percent_complete(&self) -> i32 {
        self.percent_complete
    }

    fn current_item_index(&self) -> usize {
        self.current_item_index
    }

    fn current_item_percent(&self) -> i32 {
        self.current_item_percent_complete
    }

    fn current_item_result(&self) -> Option<OperationResult> {
        self.current_item_result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressRecordType {
    Processing,
    Completed,
}

/// Host-facing progress record.
///
/// Per-item records carry the batch record's id as `parent_activity_id` so a
/// host can nest them under one overall bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub activity_id: i32,
    pub parent_activity_id: Option<i32>,
    pub activity: String,
    pub status_description: String,
    pub percent_complete: u8,
    pub record_type: ProgressRecordType,
}

impl ProgressRecord {
    pub fn new(
        activity_id: i32,
        activity: impl Into<String>,
        status_description: impl Into<String>,
    ) -> Self {
        Self {
            activity_id,
            parent_activity_id: None,
            activity: activity.into(),
            status_description: status_description.into(),
            percent_complete: 0,
            record_type: ProgressRecordType::Processing,
        }
    }

    pub fn with_parent(mut self, parent_activity_id: i32) -> Self {
        self.parent_activity_id = Some(parent_activity_id);
        self
    }

    /// Set the percent, clamped into 0-100.
    pub fn with_percent(mut self, percent: i32) -> Self {
        self.percent_complete = percent.clamp(0, 100) as u8;
        self
    }

    pub fn completed(mut self) -> Self {
        self.record_type = ProgressRecordType::Completed;
        self.percent_complete = 100;
        self
    }
}
