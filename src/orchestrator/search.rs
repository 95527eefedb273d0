use crate::engine::search_async;
use crate::error::JobError;
use crate::jobs::{Job, JobInfo, timeout_token};
use crate::models::{EngineWarning, ErrorRecord, OperationResultCode, Update};
use crate::orchestrator::UpdateOrchestrator;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub code: OperationResultCode,
    /// Updates that passed the title filter.
    pub updates: Vec<Update>,
    /// Engine warnings, already shaped as error records.
    pub warnings: Vec<ErrorRecord>,
}

fn warning_record(warning: &EngineWarning) -> ErrorRecord {
    let mut record = ErrorRecord::for_code(warning.code, None);
    if !warning.message.is_empty() {
        record.message = format!("{}: {}", record.message, warning.message);
    }
    record
}

impl UpdateOrchestrator {
    /// Search for updates matching `criteria`.
    ///
    /// Every returned update is recorded in the cache; only those whose title
    /// matches `filter` (if any) are returned.
    ///
    /// # Errors
    /// `JobError::Aborted` / `JobError::BatchFailed` when the engine reports an
    /// aborted or failed search, `JobError::Cancelled` when the engine call
    /// fails after `cancel` fired.
    pub async fn search(
        &self,
        criteria: &str,
        filter: Option<&Regex>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, JobError> {
        self.metrics.record_search();
        let started = Instant::now();
        let result = search_async(self.engine.searcher.as_ref(), criteria, cancel).await;
        self.metrics.record_operation_time(started.elapsed());
        let result = result?;

        match result.code {
            OperationResultCode::Aborted => return Err(JobError::Aborted),
            OperationResultCode::Failed => {
                return Err(JobError::BatchFailed {
                    hresult: result.hresult,
                });
            }
            _ => {}
        }

        let warnings = result.warnings.iter().map(warning_record).collect();
        let mut updates = Vec::with_capacity(result.updates.len());
        for update in result.updates {
            self.cache.set(update.clone());
            if filter.is_none_or(|re| re.is_match(&update.title)) {
                updates.push(update);
            }
        }

        tracing::info!(
            "Search '{}' finished with {:?}: {} update(s) matched",
            criteria,
            result.code,
            updates.len()
        );

        Ok(SearchOutcome {
            code: result.code,
            updates,
            warnings,
        })
    }

    /// Run [`search`](Self::search) as a background job.
    ///
    /// Warnings land in the job's Error stream and matches in its Output stream.
    pub fn search_as_job(
        &self,
        criteria: impl Into<String>,
        filter: Option<Regex>,
    ) -> Result<Arc<Job<Update>>, JobError> {
        let criteria = criteria.into();
        let job = Job::new(
            JobInfo::new("Search", format!("Get-WindowsUpdate -Criteria \"{}\"", criteria))
                .with_type("UpdateSearchJob"),
        );

        let this = self.clone();
        let _guard = self.runtime.enter();
        let task = job.start(move |ctx, token| async move {
            let outcome = this.search(&criteria, filter.as_ref(), &token).await?;
            ctx.write_verbose(format!("{} update(s) matched", outcome.updates.len()));
            for warning in outcome.warnings {
                ctx.write_error(warning);
            }
            for update in outcome.updates {
                ctx.write_object(update);
            }
            ctx.set_result_code(outcome.code);
            Ok(())
        })?;
        drop(task);

        self.track(&job);
        Ok(job)
    }

    /// Cached titles starting with `prefix`, bounded by the completion timeout.
    ///
    /// Returns whatever matched before the timeout fired.
    pub fn suggest_titles(&self, prefix: &str) -> Vec<String> {
        let _guard = self.runtime.enter();
        let token = timeout_token(
            &CancellationToken::new(),
            self.settings.completion_timeout(),
        );
        let titles = self.cache.complete_titles(prefix, &token);
        token.cancel();
        titles
    }
}
