//! A spawned task that owns its cancellation.
//!
//! Replaces timer callback chains: the task body sleeps through
//! [`TaskContext::sleep`], which returns early on cancellation, and checks
//! [`TaskContext::is_alive`] before publishing anything.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a spawned task. Dropping it cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    cancel_tx: watch::Sender<bool>,
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// The task body's view of its own cancellation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    cancel_rx: watch::Receiver<bool>,
    alive: Arc<AtomicBool>,
}

impl TaskContext {
    /// False once the owning [`ScheduledTask`] is cancelled or dropped.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Sleep for `delay`. Returns `false` if cancelled before or during it.
    pub async fn sleep(&mut self, delay: Duration) -> bool {
        if !self.is_alive() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.is_alive(),
            _ = self.cancel_rx.changed() => false,
        }
    }
}

impl ScheduledTask {
    /// Spawn `body` on the current tokio runtime.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));
        let ctx = TaskContext {
            cancel_rx,
            alive: alive.clone(),
        };
        let handle = tokio::spawn(body(ctx));

        Self {
            cancel_tx,
            alive,
            handle: Some(handle),
        }
    }

    /// Stop scheduling. An in-flight await inside the body is not
    /// interrupted; the body observes `is_alive() == false` afterwards.
    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
        let _ = self.cancel_tx.send(true);
    }

    /// Cancel and wait for the body to return.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Cancel and wait at most `grace` for the body to return. Returns
    /// `false` if it is still stuck in an await; it is then left detached.
    pub async fn shutdown_within(mut self, grace: Duration) -> bool {
        self.cancel();
        match self.handle.take() {
            Some(handle) => tokio::time::timeout(grace, handle).await.is_ok(),
            None => true,
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
