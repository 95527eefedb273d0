// Begin/end bridging - adapts callback-driven engine operations into futures
//
// The completion callback resolves a oneshot; cancellation of the caller's token
// is forwarded to the handle's request_abort exactly once, after which we keep
// waiting for the engine to acknowledge. `end` is always called once after
// completion and the handle is cleaned up on every exit path, including when the
// future is dropped.
//
// Whatever `end` returns after an abort is handed back as is: an aborted batch
// still carries the results of the items that finished before the abort, and
// the caller decides what a cancelled-but-completed batch means.

use crate::engine::{
    DownloadOptions, InstallOptions, OperationHandle, OperationHandleRef, UpdateDownloader,
    UpdateInstaller, UpdateSearcher,
};
use crate::error::{EngineError, JobError};
use crate::models::{BatchResult, DownloadProgress, InstallProgress, SearchResult, Update};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

struct CleanupGuard(OperationHandleRef);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.0.cleanup();
        tracing::trace!("Engine operation handle released");
    }
}

fn completion_signal() -> (Box<dyn FnOnce() + Send>, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    let callback = Box::new(move || {
        if tx.send(()).is_err() {
            tracing::debug!("Engine completed after its awaiter went away");
        }
    });
    (callback, rx)
}

async fn complete_operation<R>(
    handle: OperationHandleRef,
    mut completed: oneshot::Receiver<()>,
    cancel: &CancellationToken,
    end: impl FnOnce(&dyn OperationHandle) -> Result<R, EngineError>,
) -> Result<R, JobError> {
    let _cleanup = CleanupGuard(Arc::clone(&handle));
    let mut abort_requested = false;

    loop {
        tokio::select! {
            done = &mut completed => {
                done.map_err(|_| EngineError::CompletionDropped)?;
                break;
            }
            _ = cancel.cancelled(), if !abort_requested => {
                tracing::info!("Cancellation requested, asking the engine to abort");
                handle.request_abort();
                abort_requested = true;
            }
        }
    }

    match end(handle.as_ref()) {
        Ok(result) => Ok(result),
        Err(e) if abort_requested => {
            tracing::debug!("Engine operation ended with an error after abort: {}", e);
            Err(JobError::Cancelled)
        }
        Err(e) => Err(e.into()),
    }
}

/// Run a search to completion.
pub async fn search_async(
    searcher: &dyn UpdateSearcher,
    criteria: &str,
    cancel: &CancellationToken,
) -> Result<SearchResult, JobError> {
    let (on_completed, completed) = completion_signal();
    let handle = searcher.begin_search(criteria, on_completed)?;
    tracing::debug!("Search started: {}", criteria);
    complete_operation(handle, completed, cancel, |h| searcher.end_search(h)).await
}

/// Download `updates`, forwarding progress snapshots to `on_progress`.
pub async fn download_async<P>(
    downloader: &dyn UpdateDownloader,
    updates: &[Update],
    options: &DownloadOptions,
    on_progress: P,
    cancel: &CancellationToken,
) -> Result<BatchResult, JobError>
where
    P: Fn(&DownloadProgress) + Send + Sync + 'static,
{
    let (on_completed, completed) = completion_signal();
    let handle =
        downloader.begin_download(updates, options, Arc::new(on_progress), on_completed)?;
    tracing::debug!("Download of {} update(s) started", updates.len());
    complete_operation(handle, completed, cancel, |h| downloader.end_download(h)).await
}

/// Install `updates`, forwarding progress snapshots to `on_progress`.
pub async fn install_async<P>(
    installer: &dyn UpdateInstaller,
    updates: &[Update],
    options: &InstallOptions,
    on_progress: P,
    cancel: &CancellationToken,
) -> Result<BatchResult, JobError>
where
    P: Fn(&InstallProgress) + Send + Sync + 'static,
{
    let (on_completed, completed) = completion_signal();
    let handle = installer.begin_install(updates, options, Arc::new(on_progress), on_completed)?;
    tracing::debug!("Install of {} update(s) started", updates.len());
    complete_operation(handle, completed, cancel, |h| installer.end_install(h)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CompletionCallback;
    use crate::models::OperationResultCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Handle {
        abort: AtomicBool,
        done: AtomicBool,
        cleanups: AtomicUsize,
    }

    impl OperationHandle for Handle {
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

    /// Completes after the abort flag is set, or after a short delay.
    #[derive(Default)]
    struct SlowSearcher {
        wait_for_abort: bool,
        drop_callback: bool,
        fail_after_abort: bool,
        ends: AtomicUsize,
        handle: Mutex<Option<Arc<Handle>>>,
    }

    impl UpdateSearcher for SlowSearcher {
        fn begin_search(
            &self,
            _criteria: &str,
            on_completed: CompletionCallback,
        ) -> Result<OperationHandleRef, EngineError> {
            let handle = Arc::new(Handle::default());
            *self.handle.lock().unwrap() = Some(Arc::clone(&handle));
            if self.drop_callback {
                drop(on_completed);
                return Ok(handle);
            }
            let wait_for_abort = self.wait_for_abort;
            let worker = Arc::clone(&handle);
            std::thread::spawn(move || {
                if wait_for_abort {
                    while !worker.abort.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                } else {
                    std::thread::sleep(Duration::from_millis(10));
                }
                worker.done.store(true, Ordering::SeqCst);
                on_completed();
            });
            Ok(handle)
        }

        fn end_search(&self, _handle: &dyn OperationHandle) -> Result<SearchResult, EngineError> {
            self.ends.fetch_add(1, Ordering::SeqCst);
            let aborted = self.handle().abort.load(Ordering::SeqCst);
            if aborted && self.fail_after_abort {
                return Err(EngineError::call(0x80004004, "operation aborted"));
            }
            Ok(SearchResult {
                code: if aborted {
                    OperationResultCode::Aborted
                } else {
                    OperationResultCode::Succeeded
                },
                hresult: 0,
                updates: vec![Update::new("KB1")],
                warnings: Vec::new(),
            })
        }
    }

    impl SlowSearcher {
        fn handle(&self) -> Arc<Handle> {
            self.handle.lock().unwrap().clone().unwrap()
        }
    }

    #[tokio::test]
    async fn test_search_completes_and_cleans_up() {
        let searcher = SlowSearcher::default();
        let result = search_async(&searcher, "IsInstalled=0", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.updates.len(), 1);
        assert_eq!(searcher.ends.load(Ordering::SeqCst), 1);
        assert_eq!(searcher.handle().cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_requests_abort_and_waits_for_ack() {
        let searcher = SlowSearcher {
            wait_for_abort: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = search_async(&searcher, "IsInstalled=0", &cancel)
            .await
            .unwrap();

        // The engine's own answer comes back, partial results included.
        assert_eq!(result.code, OperationResultCode::Aborted);
        assert_eq!(result.updates.len(), 1);
        let handle = searcher.handle();
        assert!(handle.abort.load(Ordering::SeqCst));
        assert!(handle.is_completed());
        assert_eq!(searcher.ends.load(Ordering::SeqCst), 1);
        assert_eq!(handle.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_end_failing_after_abort_is_cancellation() {
        let searcher = SlowSearcher {
            wait_for_abort: true,
            fail_after_abort: true,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = search_async(&searcher, "IsInstalled=0", &cancel).await;

        assert!(matches!(result, Err(JobError::Cancelled)));
        assert_eq!(searcher.ends.load(Ordering::SeqCst), 1);
        assert_eq!(searcher.handle().cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_completion_is_an_engine_error() {
        let searcher = SlowSearcher {
            drop_callback: true,
            ..Default::default()
        };
        let result = search_async(&searcher, "x", &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(JobError::Engine(EngineError::CompletionDropped))
        ));
        assert_eq!(searcher.ends.load(Ordering::SeqCst), 0);
        assert_eq!(searcher.handle().cleanups.load(Ordering::SeqCst), 1);
    }
}
