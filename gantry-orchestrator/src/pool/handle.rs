//! Task handles and cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, oneshot};

#[derive(Debug, Error)]
pub enum TaskWaitError {
    #[error("timed out waiting for task result")]
    Timeout,
    #[error("task terminated without producing a result")]
    Gone,
}

/// Cooperative cancellation signal shared between a handle and its task.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // register before checking the flag so a concurrent cancel is
            // never missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle over an asynchronously running piece of work.
///
/// The task's outcome (including a captured failure) is only observed through
/// `get`; dropping the handle detaches the task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<T>,
    resolved: Option<Result<T, TaskWaitError>>,
    cancel: CancelToken,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task resolves or `timeout` elapses.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<(), TaskWaitError> {
        if self.resolved.is_some() {
            return Ok(());
        }
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => return Err(TaskWaitError::Timeout),
            },
            None => (&mut self.rx).await,
        };
        self.resolved = Some(outcome.map_err(|_| TaskWaitError::Gone));
        Ok(())
    }

    /// Blocks until resolved and returns the task's outcome.
    pub async fn get(mut self) -> Result<T, TaskWaitError> {
        self.wait(None).await?;
        self.resolved.take().expect("resolved after wait")
    }

    /// Signals the task to terminate. Best-effort: the task observes the
    /// token at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// Spawns `make_task` with a fresh cancellation token.
pub fn spawn_cancellable<T, F, Fut>(make_task: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    spawn_with(CancelToken::new(), make_task)
}

/// Spawns `make_task` bound to the caller's cancellation token.
pub fn spawn_with<T, F, Fut>(cancel: CancelToken, make_task: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let task = make_task(cancel.clone());
    tokio::spawn(async move {
        let outcome = task.await;
        let _ = tx.send(outcome);
    });
    TaskHandle {
        rx,
        resolved: None,
        cancel,
    }
}
