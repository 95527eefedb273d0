use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration, stored as `updatejobs.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub orchestration: OrchestrationSettings,
    pub logging: LoggingConfig,
}

/// Knobs that shape how install requests are orchestrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    /// Progress activity ids are allocated above this value.
    pub progress_id_base: i32,

    /// Upper bound for argument-completion lookups.
    pub completion_timeout_ms: u64,

    /// Download updates that are not yet present instead of rejecting them.
    pub download_before_install: bool,

    pub force: bool,

    pub force_quiet: bool,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            progress_id_base: 2000,
            completion_timeout_ms: 3000,
            download_before_install: true,
            force: false,
            force_quiet: false,
        }
    }
}

impl OrchestrationSettings {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub log_prefix: String,
    pub debug_mode: bool,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_prefix: "updatejobs".to_string(),
            debug_mode: false,
            console_output: false,
        }
    }
}
