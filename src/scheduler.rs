// SPDX-License-Identifier: MPL-2.0

//! Periodic task scheduling.
//!
//! Reconciliation and the in-view feed refresh are plain async callbacks.
//! Whatever drives them (an OS background facility, a Tokio interval, a test
//! calling the callback by hand) only has to implement
//! [`BackgroundScheduler`].

use crate::runtime;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a background callback reports back to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    NewData,
    NoData,
    Failed,
}

pub type TaskCallback = Arc<dyn Fn() -> BoxFuture<'static, TaskResult> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid interval for task '{0}'")]
    InvalidInterval(String),
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

pub trait BackgroundScheduler: Send + Sync {
    /// Run `callback` repeatedly, no more often than `min_interval`.
    /// Registering an id again replaces the earlier registration.
    fn register(
        &self,
        task_id: &str,
        min_interval: Duration,
        callback: TaskCallback,
    ) -> Result<(), SchedulerError>;

    /// Stop a task. Returns whether it was registered.
    fn cancel(&self, task_id: &str) -> bool;
}

/// Drive one callback to completion from synchronous code, e.g. an OS
/// background hook running on a foreign thread.
pub fn run_blocking(callback: &TaskCallback) -> TaskResult {
    runtime::block_on(callback())
}

/// Interval-based scheduler on a Tokio runtime
pub struct TokioScheduler {
    handle: Handle,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Scheduler on the crate's shared runtime
    pub fn shared() -> Self {
        Self::new(runtime::handle())
    }

    /// Scheduler on the runtime the caller is running in
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))
    }

    pub fn is_registered(&self, task_id: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .is_some_and(|task| !task.is_finished())
    }
}

impl BackgroundScheduler for TokioScheduler {
    fn register(
        &self,
        task_id: &str,
        min_interval: Duration,
        callback: TaskCallback,
    ) -> Result<(), SchedulerError> {
        if min_interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(task_id.to_string()));
        }

        let id = task_id.to_string();
        let task = self.handle.spawn(async move {
            // First run after one full interval, like the OS facilities
            let mut ticker = tokio::time::interval_at(Instant::now() + min_interval, min_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match callback().await {
                    TaskResult::Failed => warn!(task = %id, "background task failed"),
                    result => debug!(task = %id, ?result, "background task finished"),
                }
            }
        });

        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_string(), task);
        if let Some(previous) = previous {
            previous.abort();
        }

        info!(task = task_id, interval_secs = min_interval.as_secs(), "registered background task");
        Ok(())
    }

    fn cancel(&self, task_id: &str) -> bool {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        match removed {
            Some(task) => {
                task.abort();
                info!(task = task_id, "cancelled background task");
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}
