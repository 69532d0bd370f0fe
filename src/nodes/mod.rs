// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reference node kinds.

mod input;
mod transfer;

pub use input::InputNodes;
pub use transfer::{Activation, TransferNodes};

use std::sync::Mutex;

use crate::config::Options;
use crate::graph::NodeCore;
use crate::scheduler::lock;
use crate::tensor::{Cube, Tensor};

/// Per-slot storage of the last tensor a pass produced.
#[derive(Debug)]
struct SlotStore {
    slots: Vec<Mutex<Option<Tensor<f32>>>>,
}

impl SlotStore {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn put(&self, slot: usize, tensor: Tensor<f32>) {
        *lock(&self.slots[slot]) = Some(tensor);
    }

    fn get(&self, slot: usize) -> Option<Tensor<f32>> {
        lock(&self.slots[slot]).clone()
    }

    /// One tensor per slot; slots that produced nothing read as zeros.
    fn snapshot(&self, core: &NodeCore) -> Vec<Tensor<f32>> {
        (0..self.slots.len())
            .map(|slot| {
                self.get(slot)
                    .unwrap_or_else(|| vec![Cube::zeros(core.fsize()); core.batch_size()])
            })
            .collect()
    }

    fn clear(&self) {
        for slot in &self.slots {
            lock(slot).take();
        }
    }
}

/// Options snapshot shared by the reference kinds.
fn describe(core: &NodeCore, kind: &str) -> Options {
    let layout = core.layout();
    let mut options = core.options().clone();
    options.insert("type", kind);
    options.insert("size", layout.size);
    options.insert("batch_size", layout.batch_size);
    options.insert("fsize", layout.fsize);
    options.insert("fwd_priority", layout.fwd_priority);
    options.insert("bwd_priority", layout.bwd_priority);
    options
}
