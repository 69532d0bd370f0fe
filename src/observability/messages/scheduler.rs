// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the task scheduler.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Worker pool started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use cubegraph::observability::messages::scheduler::WorkerPoolStarted;
///
/// let msg = WorkerPoolStarted { workers: 8, thread_name: "cubegraph-worker" };
/// assert_eq!(msg.to_string(), "Task scheduler started with 8 workers (cubegraph-worker)");
/// ```
pub struct WorkerPoolStarted<'a> {
    pub workers: usize,
    pub thread_name: &'a str,
}

impl Display for WorkerPoolStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task scheduler started with {} workers ({})",
            self.workers, self.thread_name
        )
    }
}

impl StructuredLog for WorkerPoolStarted<'_> {
    fn log(&self) {
        tracing::info!(
            workers = self.workers,
            thread_name = self.thread_name,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "worker_pool",
            span_name = name,
            workers = self.workers,
            thread_name = self.thread_name,
        )
    }
}

/// A task failed and nobody was waiting on it.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct UnobservedTaskFailure<'a> {
    pub task_id: u64,
    pub priority: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for UnobservedTaskFailure<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task {} (priority {}) failed with no waiter: {}",
            self.task_id, self.priority, self.error
        )
    }
}

impl StructuredLog for UnobservedTaskFailure<'_> {
    fn log(&self) {
        tracing::error!(
            task_id = self.task_id,
            priority = self.priority,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "task_failed",
            span_name = name,
            task_id = self.task_id,
            priority = self.priority,
            error = %self.error,
        )
    }
}

/// Worker pool shut down.
///
/// # Log Level
/// `info!` - Important operational event
pub struct WorkerPoolStopped {
    pub workers: usize,
    pub submitted: u64,
}

impl Display for WorkerPoolStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task scheduler stopped: {} workers, {} tasks submitted",
            self.workers, self.submitted
        )
    }
}

impl StructuredLog for WorkerPoolStopped {
    fn log(&self) {
        tracing::info!(
            workers = self.workers,
            submitted = self.submitted,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "worker_pool_stopped",
            span_name = name,
            workers = self.workers,
            submitted = self.submitted,
        )
    }
}
