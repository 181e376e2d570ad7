use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::cancel::sleep_or_cancel;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(280);

/// Trailing-edge debounce timer for the local task set.
///
/// Every `trigger` restarts the window; only the last action scheduled within
/// a quiet period runs. Must be used from inside a `tokio::task::LocalSet`.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    parent: CancellationToken,
    pending: Option<CancellationToken>,
}

impl Debouncer {
    /// Timers are children of `parent`, so cancelling it silences the debouncer.
    pub fn new(delay: Duration, parent: CancellationToken) -> Self {
        Self {
            delay,
            parent,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn trigger<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.cancel();
        let token = self.parent.child_token();
        self.pending = Some(token.clone());
        let delay = self.delay;
        tokio::task::spawn_local(async move {
            if sleep_or_cancel(&token, delay).await.is_err() {
                trace!("debounce window restarted");
                return;
            }
            action();
            // Marks the window as spent for `is_pending`.
            token.cancel();
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
