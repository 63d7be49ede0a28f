//! Cancellation and deadline propagation for one unit of work.
//!
//! Every I/O suspension point (node connect, block fetch, storage write,
//! queue fetch) is awaited through [`RunContext::guard`], so a cancelled or
//! expired context aborts the in-flight call instead of hanging.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a guarded operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Caller-owned context carrying cancellation and an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`RunContext`] derived from the pair it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl RunContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context plus the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Derive a context that expires after `timeout`, keeping any earlier deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Returns an error if the context is already cancelled or expired.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Await `fut`, aborting it when the context is cancelled or its deadline passes.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        self.check()?;

        let cancelled = async {
            if let Some(mut rx) = self.cancel.clone() {
                // A dropped handle can never cancel, so fall through to pending.
                if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                    return;
                }
            }
            std::future::pending::<()>().await
        };
        let expired = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Interrupted::Cancelled),
            _ = expired => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_runs_to_completion() {
        let ctx = RunContext::background();
        assert_eq!(ctx.guard(async { 7 }).await, Ok(7));
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn cancel_aborts_pending_future() {
        let (ctx, handle) = RunContext::cancellable();
        let guarded = ctx.guard(std::future::pending::<()>());
        handle.cancel();
        assert_eq!(guarded.await, Err(Interrupted::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_context_rejects_new_work() {
        let (ctx, handle) = RunContext::cancellable();
        handle.cancel();
        let derived = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(derived.guard(async { 1 }).await, Err(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_slow_future() {
        let ctx = RunContext::background().with_timeout(Duration::from_millis(50));
        let slow = tokio::time::sleep(Duration::from_secs(10));
        assert_eq!(ctx.guard(slow).await, Err(Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (ctx, handle) = RunContext::cancellable();
        drop(handle);
        assert_eq!(ctx.guard(async { "done" }).await, Ok("done"));
    }

    #[test]
    fn earlier_deadline_wins() {
        let base = RunContext::background().with_timeout(Duration::from_secs(1));
        let derived = base.with_timeout(Duration::from_secs(60));
        assert_eq!(base.deadline(), derived.deadline());
    }
}
