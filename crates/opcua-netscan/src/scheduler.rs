// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded background task execution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A unit of background work.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded background task execution facility.
///
/// `try_schedule` is admission-controlled and may reject work; `run` is for
/// the long-lived tasks that must always start (the continuous scan loop).
pub trait TaskScheduler: Send + Sync {
    /// Try to schedule a bounded unit of work. Returns false when the
    /// scheduler is at capacity; the work is not run in that case.
    fn try_schedule(&self, task: TaskFuture) -> bool;

    /// Run a long-lived unit of work unconditionally.
    fn run(&self, task: TaskFuture) -> JoinHandle<()>;
}

/// Scheduler spawning onto the tokio runtime with a concurrency cap on
/// one-shot work.
pub struct BoundedScheduler {
    permits: Arc<Semaphore>,
}

impl BoundedScheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }
}

impl Default for BoundedScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TaskScheduler for BoundedScheduler {
    fn try_schedule(&self, task: TaskFuture) -> bool {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    task.await;
                    drop(permit);
                });
                true
            }
            Err(_) => false,
        }
    }

    fn run(&self, task: TaskFuture) -> JoinHandle<()> {
        tokio::spawn(task)
    }
}
