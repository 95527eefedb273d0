use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Token derived from `parent` that also cancels itself after `timeout`.
///
/// # Panics
/// Panics if called outside a tokio runtime context.
pub fn timeout_token(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!("Timeout token fired after {:?}", timeout);
                timer.cancel();
            }
            _ = timer.cancelled() => {}
        }
    });
    token
}

/// Pull items from a lazy iterator until it ends or `token` is cancelled.
///
/// Items produced before cancellation are kept; the rest of the iterator is
/// never evaluated.
pub fn take_until_cancelled<I>(items: I, token: &CancellationToken) -> Vec<I::Item>
where
    I: IntoIterator,
{
    items
        .into_iter()
        .take_while(|_| !token.is_cancelled())
        .collect()
}
