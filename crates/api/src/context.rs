//! Execution context carried through every retrieval call.
//!
//! A [Context] bundles an optional deadline with the cancellation signals
//! of the context and all of its ancestors. Deriving a child through
//! [Context::with_cancel], [Context::with_timeout] or
//! [Context::with_deadline] hands back a [CancelHandle]. Dropping that
//! handle cancels the child (and every context derived from it), so the
//! resources bound to a child are released on every exit path of the
//! scope that owns the handle, including unwinding.
//!
//! The deadline of a child is never later than the deadline of its
//! parent: the tighter ceiling always governs.

use crate::*;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Execution context for retrieval operations. Cheap to clone.
#[derive(Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Vec<watch::Receiver<bool>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline)
            .field("depth", &self.cancel.len())
            .finish()
    }
}

/// Cancels the [Context] it was created with when dropped, or
/// earlier through [CancelHandle::cancel].
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Cancel the associated context now.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Context {
    /// A root context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// The deadline of this context, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Derive a child context that can be cancelled independently.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        self.child(self.deadline)
    }

    /// Derive a child context whose deadline is `timeout` from now,
    /// or the deadline of this context if that is earlier. A timeout too
    /// large to represent as an instant adds no ceiling.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(self.deadline),
        }
    }

    /// Derive a child context with the given deadline, or the deadline
    /// of this context if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        self.child(Some(deadline))
    }

    fn child(&self, deadline: Option<Instant>) -> (Self, CancelHandle) {
        let (send, recv) = watch::channel(false);
        let mut cancel = self.cancel.clone();
        cancel.push(recv);
        (Self { deadline, cancel }, CancelHandle(send))
    }

    /// Returns the reason this context is done, or `None` if it is
    /// still live. Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<LassieError> {
        if self.cancel.iter().any(|r| *r.borrow()) {
            return Some(LassieError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(LassieError::DeadlineExceeded)
            }
            _ => None,
        }
    }

    /// Resolves once this context is cancelled or its deadline passes,
    /// with the corresponding error.
    pub async fn done(&self) -> LassieError {
        if let Some(err) = self.err() {
            return err;
        }

        let cancelled = async {
            if self.cancel.is_empty() {
                return futures::future::pending::<()>().await;
            }
            let waits = self.cancel.iter().map(|r| {
                let mut r = r.clone();
                Box::pin(async move {
                    // An error here means the handle is gone, and a
                    // handle always signals cancellation when dropped.
                    let _ = r.wait_for(|c| *c).await;
                })
            });
            futures::future::select_all(waits).await;
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancelled => LassieError::Cancelled,
            _ = expired => LassieError::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless this context finishes first,
    /// in which case `fut` is dropped and the context error is returned.
    pub async fn run<T, F>(&self, fut: F) -> LassieResult<T>
    where
        F: std::future::Future<Output = LassieResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            r = fut => r,
            err = self.done() => Err(err),
        }
    }
}
