// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Plain SGD with momentum and weight decay for the reference kinds.
//!
//! `v = momentum * v - eta * (g + weight_decay * w)`, then `w += v`.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::consts::{DEFAULT_ETA, DEFAULT_MOMENTUM, DEFAULT_WEIGHT_DECAY};
use crate::tensor::Cube;
use crate::traits::Trainable;

/// Hyperparameters readable from passes and writable by the driver.
#[derive(Debug)]
pub struct Hyperparams {
    eta: AtomicU32,
    momentum: AtomicU32,
    weight_decay: AtomicU32,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self::new(Sgd {
            eta: DEFAULT_ETA,
            momentum: DEFAULT_MOMENTUM,
            weight_decay: DEFAULT_WEIGHT_DECAY,
        })
    }
}

impl Hyperparams {
    pub fn new(sgd: Sgd) -> Self {
        Self {
            eta: AtomicU32::new(sgd.eta.to_bits()),
            momentum: AtomicU32::new(sgd.momentum.to_bits()),
            weight_decay: AtomicU32::new(sgd.weight_decay.to_bits()),
        }
    }

    pub fn snapshot(&self) -> Sgd {
        Sgd {
            eta: f32::from_bits(self.eta.load(Ordering::Acquire)),
            momentum: f32::from_bits(self.momentum.load(Ordering::Acquire)),
            weight_decay: f32::from_bits(self.weight_decay.load(Ordering::Acquire)),
        }
    }
}

impl Trainable for Hyperparams {
    fn set_eta(&self, eta: f32) {
        self.eta.store(eta.to_bits(), Ordering::Release);
    }

    fn set_momentum(&self, momentum: f32) {
        self.momentum.store(momentum.to_bits(), Ordering::Release);
    }

    fn set_weight_decay(&self, weight_decay: f32) {
        self.weight_decay.store(weight_decay.to_bits(), Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    pub eta: f32,
    pub momentum: f32,
    pub weight_decay: f32,
}

impl Sgd {
    pub fn step(&self, values: &mut [f32], velocity: &mut [f32], gradient: &[f32]) {
        for ((w, v), &g) in values.iter_mut().zip(velocity.iter_mut()).zip(gradient) {
            *v = self.momentum * *v - self.eta * (g + self.weight_decay * *w);
            *w += *v;
        }
    }
}

/// A weight cube with its momentum buffer.
#[derive(Debug, Clone)]
pub struct Parameter {
    value: Cube<f32>,
    velocity: Cube<f32>,
}

impl Parameter {
    pub fn new(value: Cube<f32>) -> Self {
        let velocity = Cube::zeros(value.size());
        Self { value, velocity }
    }

    pub fn value(&self) -> &Cube<f32> {
        &self.value
    }

    pub fn update(&mut self, gradient: &Cube<f32>, sgd: &Sgd) {
        sgd.step(self.value.data_mut(), self.velocity.data_mut(), gradient.data());
    }
}
