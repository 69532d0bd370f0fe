// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::errors::TaskError;
use crate::scheduler::{lock, TaskHandle};

/// Handles of the tasks one node has submitted and nobody has waited on yet.
#[derive(Debug, Default)]
pub struct PendingWork {
    handles: Mutex<Vec<TaskHandle>>,
    dispatched: AtomicU64,
}

impl PendingWork {
    pub fn push(&self, handle: TaskHandle) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        lock(&self.handles).push(handle);
    }

    /// Total submissions made on behalf of this node.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.handles).is_empty()
    }

    /// Wait for every handle currently held. Returns how many were waited on
    /// and every failure among them with the priority its task ran at, in
    /// submission order.
    pub fn wait_all(&self) -> (usize, Vec<(usize, TaskError)>) {
        let handles = std::mem::take(&mut *lock(&self.handles));
        let count = handles.len();
        let failures = handles
            .into_iter()
            .filter_map(|handle| {
                let priority = handle.priority();
                handle.wait().err().map(|err| (priority, err))
            })
            .collect();
        (count, failures)
    }
}
