//! Cooperative cancellation for long-running transport steps

use crate::{PodError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared cancel flag.
///
/// Clones observe the same flag. Waits made through [`CancelHandle::sleep`]
/// wake up as soon as the flag is raised.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag has been raised
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PodError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once the flag has been raised
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => self.check(),
            _ = &mut notified => Err(PodError::Cancelled),
        }
    }
}
