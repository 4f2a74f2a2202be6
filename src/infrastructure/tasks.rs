//! Task Scope Module
//!
//! Background work (polling, deferred coasts, rotation and gyro loops) is
//! tied to one connection session. Dropping or cancelling the scope stops
//! every task spawned through it at its next await point.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner of a connection session's background tasks
#[derive(Debug)]
pub struct TaskScope {
    cancel: watch::Sender<bool>,
}

/// Observer half handed to every task of a scope
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: watch::Receiver<bool>,
}

impl TaskScope {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self { cancel }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            cancelled: self.cancel.subscribe(),
        }
    }

    /// Spawn a task that is dropped as soon as the scope is cancelled
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = future => {}
            }
        })
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once the scope is cancelled or dropped
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        // Err means the sender is gone, which also ends the session
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration`; `false` if the scope was cancelled first
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }
}
