// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Random initializers.
//!
//! Every initializer takes the random source explicitly so runs are
//! reproducible from a single seed.

use rand::distributions::{Bernoulli, Distribution, Uniform};
use rand::Rng;

use crate::errors::OptionsError;
use crate::tensor::Cube;

pub trait Initializer {
    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R, values: &mut [f32]);

    fn initialize_cube<R: Rng + ?Sized>(&self, rng: &mut R, cube: &mut Cube<f32>) {
        self.initialize(rng, cube.data_mut());
    }
}

/// Uniform values in `[low, high]`.
#[derive(Debug, Clone, Copy)]
pub struct UniformInit {
    low: f32,
    high: f32,
}

impl UniformInit {
    pub fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// Symmetric range `[-bound, bound]`.
    pub fn symmetric(bound: f32) -> Self {
        Self::new(-bound, bound)
    }
}

impl Initializer for UniformInit {
    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R, values: &mut [f32]) {
        let dist = Uniform::new_inclusive(self.low, self.high);
        for v in values.iter_mut() {
            *v = dist.sample(rng);
        }
    }
}

/// Draws booleans that are `true` with probability `p`.
#[derive(Debug, Clone, Copy)]
pub struct BernoulliInit {
    dist: Bernoulli,
}

impl BernoulliInit {
    pub fn new(p: f64) -> Result<Self, OptionsError> {
        let dist = Bernoulli::new(p).map_err(|_| OptionsError::OutOfRange {
            key: "ratio".to_string(),
            value: p,
            range: "[0, 1]",
        })?;
        Ok(Self { dist })
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.dist.sample(rng)
    }
}

impl Initializer for BernoulliInit {
    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R, values: &mut [f32]) {
        for v in values.iter_mut() {
            *v = if self.draw(rng) { 1.0 } else { 0.0 };
        }
    }
}
