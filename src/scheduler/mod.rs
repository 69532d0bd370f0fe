// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Priority-aware task scheduler.

mod priority_queue;
mod task_manager;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use priority_queue::{PrioritizedTask, PriorityWorkQueue};
pub use task_manager::{ErrorSink, TaskHandle, TaskManager};

/// Lock a mutex, recovering the data if a panicking job poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
