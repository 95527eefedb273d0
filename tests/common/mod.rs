//! Shared fixtures for integration tests
//!
//! - `ScriptedEngine`: in-memory engine implementing all three capabilities.
//!   Each batch runs on its own OS thread and fires progress and completion
//!   callbacks from there, like the real engine.
//! - `RecordingHost`: a `Host` that records every call and refuses calls made
//!   from any thread other than the one that created it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;
use updatejobs::engine::{
    CompletionCallback, DownloadOptions, InstallOptions, OperationHandle, OperationHandleRef,
    ProgressCallback, UpdateDownloader, UpdateInstaller, UpdateSearcher,
};
use updatejobs::error::{EngineError, HostError};
use updatejobs::host::{Host, ShouldContinue};
use updatejobs::models::{
    BatchResult, DownloadPhase, DownloadProgress, ErrorRecord, InstallProgress, OperationResult,
    OperationResultCode, ProgressRecord, SearchResult, Update,
};

const MB: u64 = 1_048_576;

/// What the engine does with one item of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail(u32),
    /// Succeeds, but the 100% progress callback is never fired.
    Silent,
    /// The engine aborts the batch on its own at this item.
    Abort,
    /// Stays at 50% until abort is requested.
    HangUntilAbort,
}

#[derive(Default)]
pub struct ScriptedHandle {
    abort: AtomicBool,
    done: AtomicBool,
    pub cleanups: AtomicUsize,
    result: Mutex<Option<BatchResult>>,
}

impl ScriptedHandle {
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

impl OperationHandle for ScriptedHandle {
    fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    fn is_completed(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedEngine {
    search_result: Mutex<SearchResult>,
    download_scripts: Mutex<HashMap<String, Script>>,
    install_scripts: Mutex<HashMap<String, Script>>,
    handles: Mutex<Vec<Arc<ScriptedHandle>>>,
    pub calls: Mutex<Vec<String>>,
    step: Duration,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            search_result: Mutex::new(SearchResult {
                code: OperationResultCode::Succeeded,
                hresult: 0,
                updates: Vec::new(),
                warnings: Vec::new(),
            }),
            download_scripts: Mutex::new(HashMap::new()),
            install_scripts: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            step: Duration::from_millis(2),
        }
    }

    pub fn with_search_result(self, result: SearchResult) -> Self {
        *self.search_result.lock().unwrap() = result;
        self
    }

    pub fn with_download(self, title: &str, script: Script) -> Self {
        self.download_scripts
            .lock()
            .unwrap()
            .insert(title.to_string(), script);
        self
    }

    pub fn with_install(self, title: &str, script: Script) -> Self {
        self.install_scripts
            .lock()
            .unwrap()
            .insert(title.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn handles(&self) -> Vec<Arc<ScriptedHandle>> {
        self.handles.lock().unwrap().clone()
    }

    fn register(&self, call: String) -> Arc<ScriptedHandle> {
        self.calls.lock().unwrap().push(call);
        let handle = Arc::new(ScriptedHandle::default());
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        handle
    }

    fn scripts_for(scripts: &Mutex<HashMap<String, Script>>, updates: &[Update]) -> Vec<Script> {
        let scripts = scripts.lock().unwrap();
        updates
            .iter()
            .map(|u| scripts.get(&u.title).copied().unwrap_or(Script::Succeed))
            .collect()
    }

    fn take_result(&self, handle: &dyn OperationHandle) -> Result<BatchResult, EngineError> {
        let target = handle as *const dyn OperationHandle as *const ();
        let handles = self.handles.lock().unwrap();
        let found = handles
            .iter()
            .find(|h| Arc::as_ptr(h) as *const () == target)
            .ok_or_else(|| EngineError::call(0x80004005, "unknown operation handle"))?;
        let result = found.result.lock().unwrap().clone();
        result.ok_or_else(|| EngineError::call(0x80004005, "operation still running"))
    }

    fn run_batch<P, M>(
        &self,
        handle: Arc<ScriptedHandle>,
        scripts: Vec<Script>,
        make: M,
        on_progress: ProgressCallback<P>,
        on_completed: CompletionCallback,
    ) where
        P: 'static,
        M: Fn(usize, i32, i32, Option<OperationResult>) -> P + Send + 'static,
    {
        let step = self.step;
        thread::spawn(move || {
            let count = scripts.len().max(1) as i32;
            let overall = |index: usize, percent: i32| (index as i32 * 100 + percent) / count;
            let mut results = Vec::with_capacity(scripts.len());
            let mut aborted = false;

            for (index, script) in scripts.iter().enumerate() {
                if aborted || handle.abort_requested() {
                    aborted = true;
                    results.push(OperationResult::aborted());
                    continue;
                }

                for percent in [0, 50] {
                    on_progress(&make(index, percent, overall(index, percent), None));
                    thread::sleep(step);
                }

                let result = match script {
                    Script::Succeed | Script::Silent => OperationResult::succeeded(),
                    Script::Fail(code) => OperationResult::failed(*code),
                    Script::Abort => OperationResult::aborted(),
                    Script::HangUntilAbort => {
                        while !handle.abort_requested() {
                            thread::sleep(Duration::from_millis(1));
                        }
                        OperationResult::aborted()
                    }
                };

                if result.code == OperationResultCode::Aborted {
                    aborted = true;
                } else if *script != Script::Silent {
                    on_progress(&make(index, 100, overall(index, 100), Some(result)));
                }
                results.push(result);
            }

            let succeeded = results.iter().filter(|r| r.code.is_success()).count();
            let failed = results
                .iter()
                .filter(|r| r.code == OperationResultCode::Failed)
                .count();
            let hresult = results
                .iter()
                .find(|r| r.code == OperationResultCode::Failed)
                .map(|r| r.hresult)
                .unwrap_or(0);

            *handle.result.lock().unwrap() = Some(BatchResult {
                code: OperationResultCode::aggregate(succeeded, failed, aborted),
                hresult,
                item_results: results,
            });
            handle.done.store(true, Ordering::SeqCst);
            on_completed();
        });
    }
}

fn titles(updates: &[Update]) -> String {
    updates
        .iter()
        .map(|u| u.title.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

impl UpdateSearcher for ScriptedEngine {
    fn begin_search(
        &self,
        criteria: &str,
        on_completed: CompletionCallback,
    ) -> Result<OperationHandleRef, EngineError> {
        let handle = self.register(format!("search:{}", criteria));
        let result = self.search_result.lock().unwrap().clone();
        let worker = Arc::clone(&handle);
        let step = self.step;
        thread::spawn(move || {
            thread::sleep(step);
            *worker.result.lock().unwrap() = Some(BatchResult {
                code: result.code,
                hresult: result.hresult,
                item_results: Vec::new(),
            });
            worker.done.store(true, Ordering::SeqCst);
            on_completed();
        });
        Ok(handle as OperationHandleRef)
    }

    fn end_search(&self, handle: &dyn OperationHandle) -> Result<SearchResult, EngineError> {
        let batch = self.take_result(handle)?;
        let mut result = self.search_result.lock().unwrap().clone();
        result.code = batch.code;
        Ok(result)
    }
}

impl UpdateDownloader for ScriptedEngine {
    fn begin_download(
        &self,
        updates: &[Update],
        _options: &DownloadOptions,
        on_progress: ProgressCallback<DownloadProgress>,
        on_completed: CompletionCallback,
    ) -> Result<OperationHandleRef, EngineError> {
        let handle = self.register(format!("download:{}", titles(updates)));
        let scripts = Self::scripts_for(&self.download_scripts, updates);
        let make = |index: usize, percent: i32, overall: i32, result: Option<OperationResult>| {
            DownloadProgress {
                percent_complete: overall,
                current_item_index: index,
                current_item_percent_complete: percent,
                current_item_phase: if percent < 100 {
                    DownloadPhase::Downloading
                } else {
                    DownloadPhase::Verifying
                },
                current_item_bytes_downloaded: percent as u64 * MB / 10,
                current_item_bytes_to_download: 10 * MB,
                total_bytes_downloaded: overall as u64 * MB / 10,
                total_bytes_to_download: 10 * MB,
                current_item_result: result,
            }
        };
        self.run_batch(Arc::clone(&handle), scripts, make, on_progress, on_completed);
        Ok(handle as OperationHandleRef)
    }

    fn end_download(&self, handle: &dyn OperationHandle) -> Result<BatchResult, EngineError> {
        self.take_result(handle)
    }
}

impl UpdateInstaller for ScriptedEngine {
    fn begin_install(
        &self,
        updates: &[Update],
        _options: &InstallOptions,
        on_progress: ProgressCallback<InstallProgress>,
        on_completed: CompletionCallback,
    ) -> Result<OperationHandleRef, EngineError> {
        let handle = self.register(format!("install:{}", titles(updates)));
        let scripts = Self::scripts_for(&self.install_scripts, updates);
        let make = |index: usize, percent: i32, overall: i32, result: Option<OperationResult>| {
            InstallProgress {
                percent_complete: overall,
                current_item_index: index,
                current_item_percent_complete: percent,
                current_item_result: result,
            }
        };
        self.run_batch(Arc::clone(&handle), scripts, make, on_progress, on_completed);
        Ok(handle as OperationHandleRef)
    }

    fn end_install(&self, handle: &dyn OperationHandle) -> Result<BatchResult, EngineError> {
        self.take_result(handle)
    }
}

/// Host that records everything and enforces thread affinity.
pub struct RecordingHost {
    owner: ThreadId,
    pub objects: Vec<Update>,
    pub progress: Vec<ProgressRecord>,
    pub errors: Vec<ErrorRecord>,
    pub messages: Vec<String>,
    /// Titles `should_process` answers "no" for.
    pub declined: Vec<String>,
    pub prompts: Vec<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            objects: Vec::new(),
            progress: Vec::new(),
            errors: Vec::new(),
            messages: Vec::new(),
            declined: Vec::new(),
            prompts: Vec::new(),
        }
    }

    pub fn declining(mut self, title: &str) -> Self {
        self.declined.push(title.to_string());
        self
    }

    pub fn object_titles(&self) -> Vec<String> {
        self.objects.iter().map(|u| u.title.clone()).collect()
    }

    fn check_thread(&self) -> Result<(), HostError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(HostError::Call("host called off its thread".to_string()))
        }
    }
}

impl Host for RecordingHost {
    type Item = Update;

    fn write_object(&mut self, item: Update) -> Result<(), HostError> {
        self.check_thread()?;
        self.objects.push(item);
        Ok(())
    }

    fn write_progress(&mut self, record: ProgressRecord) -> Result<(), HostError> {
        self.check_thread()?;
        self.progress.push(record);
        Ok(())
    }

    fn write_error(&mut self, record: ErrorRecord) -> Result<(), HostError> {
        self.check_thread()?;
        self.errors.push(record);
        Ok(())
    }

    fn write_warning(&mut self, message: &str) -> Result<(), HostError> {
        self.check_thread()?;
        self.messages.push(format!("WARNING: {}", message));
        Ok(())
    }

    fn write_verbose(&mut self, message: &str) -> Result<(), HostError> {
        self.check_thread()?;
        self.messages.push(format!("VERBOSE: {}", message));
        Ok(())
    }

    fn write_debug(&mut self, message: &str) -> Result<(), HostError> {
        self.check_thread()?;
        self.messages.push(format!("DEBUG: {}", message));
        Ok(())
    }

    fn should_process(&mut self, target: &str, action: &str) -> Result<bool, HostError> {
        self.check_thread()?;
        self.prompts.push(format!("{} {}", action, target));
        Ok(!self.declined.iter().any(|t| t == target))
    }

    fn should_continue(
        &mut self,
        query: &str,
        _caption: &str,
    ) -> Result<ShouldContinue, HostError> {
        self.check_thread()?;
        self.prompts.push(query.to_string());
        Ok(ShouldContinue::Yes)
    }
}
