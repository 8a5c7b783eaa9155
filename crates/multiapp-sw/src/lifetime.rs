//! Event lifetime extension.
//!
//! The host may tear the worker down as soon as an event is handled. Handlers
//! therefore register every piece of async work with the event through
//! [`ExtendableEvent::wait_until`], and the host awaits
//! [`ExtendableEvent::settled`] before it considers the event finished.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::ServiceWorkerError;

/// Lifetime of one dispatched event.
#[derive(Debug, Clone, Default)]
pub struct ExtendableEvent {
    tracker: TaskTracker,
    registered: Arc<AtomicUsize>,
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the event's lifetime until `work` finishes.
    ///
    /// The work starts running immediately on the tokio runtime. The
    /// returned handle resolves to the work's result.
    pub fn wait_until<F, T>(&self, work: F) -> WorkHandle<T>
    where
        F: Future<Output = Result<T, ServiceWorkerError>> + Send + 'static,
        T: Send + 'static,
    {
        self.registered.fetch_add(1, Ordering::SeqCst);
        WorkHandle(self.tracker.spawn(work))
    }

    /// Work items registered so far, finished or not.
    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    /// Work items still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every registered work item has finished, including work
    /// registered while waiting.
    pub async fn settled(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Handle to work registered with an [`ExtendableEvent`].
#[derive(Debug)]
pub struct WorkHandle<T>(JoinHandle<Result<T, ServiceWorkerError>>);

impl<T> Future for WorkHandle<T> {
    type Output = Result<T, ServiceWorkerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().0).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(ServiceWorkerError::Aborted(e.to_string()))),
        }
    }
}
