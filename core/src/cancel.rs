use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    select,
    sync::Notify,
    time::{sleep_until, Instant},
};

use crate::error::CancelReason;

/// Caller-supplied cancellation: an explicit one-shot signal and an optional deadline.
///
/// Clones share the signal, so the caller keeps one handle and passes another down.
#[derive(Clone)]
pub struct Cancellation {
    inner: Arc<Inner>,
    deadline: Option<Instant>,
}

struct Inner {
    is_set: AtomicBool,
    notify: Notify,
}

impl Default for Cancellation {
    fn default() -> Self { Self::new() }
}

impl Cancellation {
    pub fn new() -> Self { Self { inner: Arc::new(Inner { is_set: AtomicBool::new(false), notify: Notify::new() }), deadline: None } }

    /// Keeps whichever deadline comes first
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self { self.with_deadline(Instant::now() + timeout) }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    pub fn cancel(&self) {
        if !self.inner.is_set.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool { self.inner.is_set.load(Ordering::SeqCst) }

    /// The reason this cancellation has already fired, if it has
    pub fn check(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            Some(CancelReason::Signal)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(CancelReason::Deadline)
        } else {
            None
        }
    }

    /// Resolves once the signal fires or the deadline passes
    pub async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => select! {
                biased;
                _ = self.signalled() => CancelReason::Signal,
                _ = sleep_until(deadline) => CancelReason::Deadline,
            },
            None => {
                self.signalled().await;
                CancelReason::Signal
            }
        }
    }

    /// Drive `fut` unless cancellation fires first. `fut` is dropped when cancelled.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        if let Some(reason) = self.check() {
            return Err(reason);
        }
        select! {
            biased;
            reason = self.cancelled() => Err(reason),
            output = fut => Ok(output),
        }
    }

    async fn signalled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent cancel() cannot be missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
