// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised by the task scheduler.
//!
//! A `TaskError` is produced exactly once per failed unit of work. It is handed
//! to whoever waits on the task's handle, or to the scheduler's error sink when
//! nobody is waiting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    /// The unit of work returned an error.
    #[error("task {task_id} failed: {source:#}")]
    Failed {
        task_id: u64,
        #[source]
        source: anyhow::Error,
    },

    /// The unit of work panicked; the worker survived.
    #[error("task {task_id} panicked: {message}")]
    Panicked { task_id: u64, message: String },

    /// The task was dropped before it could run (runtime torn down mid-queue).
    #[error("task {task_id} was abandoned before completion")]
    Abandoned { task_id: u64 },

    /// The scheduler was already shut down when the task was submitted.
    #[error("task {task_id} rejected: scheduler is shut down")]
    ShutDown { task_id: u64 },

    /// `wait` was called from inside a worker thread, which would stall the pool.
    #[error("task {task_id} cannot be awaited from inside a scheduler worker")]
    WaitFromWorker { task_id: u64 },

    /// The worker runtime could not be created.
    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl TaskError {
    /// Identifier of the task this error belongs to, if any.
    pub fn task_id(&self) -> Option<u64> {
        match self {
            TaskError::Failed { task_id, .. }
            | TaskError::Panicked { task_id, .. }
            | TaskError::Abandoned { task_id }
            | TaskError::ShutDown { task_id }
            | TaskError::WaitFromWorker { task_id } => Some(*task_id),
            TaskError::Runtime(_) => None,
        }
    }
}
