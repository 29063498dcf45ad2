//! Bounded pool that runs one agent task per connection.
//!
//! Submission never queues: it either takes one of `max_connections`
//! permits or fails straight away. After [`AgentPool::shutdown`] every
//! submission fails with [`SubmitError::ShuttingDown`] while tasks already
//! running are left to finish.

use crate::error::SubmitError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::task::TaskTracker;

pub struct AgentPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl AgentPool {
    pub fn new(limit: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Run `task` on the pool.
    pub fn submit<F>(&self, task: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(SubmitError::ShuttingDown);
        }
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::Closed => SubmitError::ShuttingDown,
                TryAcquireError::NoPermits => SubmitError::Saturated,
            })?;
        self.tracker.spawn(async move {
            let _permit = permit;
            task.await;
        });
        Ok(())
    }

    /// Refuse new work. Running tasks are unaffected.
    pub fn shutdown(&self) {
        self.tracker.close();
        self.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Wait until the pool is shut down and every task has finished, or
    /// `timeout` passes. Returns whether the pool terminated.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }

    /// Tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
