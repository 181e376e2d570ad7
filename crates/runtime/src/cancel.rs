use std::future::Future;
use std::time::Duration;

use thiserror::Error;
pub use tokio_util::sync::CancellationToken;

/// The awaited operation lost the race against its token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Drives `fut` to completion unless `token` fires first.
///
/// Cancellation wins ties, so a future that completes in the same poll as the
/// token is cancelled still reports `Cancelled`.
pub async fn run_or_cancel<F>(token: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}

pub async fn sleep_or_cancel(token: &CancellationToken, delay: Duration) -> Result<(), Cancelled> {
    run_or_cancel(token, tokio::time::sleep(delay)).await
}
