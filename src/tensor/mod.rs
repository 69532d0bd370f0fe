// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Cube containers and the numeric kernels the reference edges use.

mod cube;
pub mod fft;
pub mod ops;

pub use cube::{accumulate, Cube, Vec3i};
pub use num_complex::Complex32;

/// A batch of cubes, one per sample. Handed over by value on every pass.
pub type Tensor<T> = Vec<Cube<T>>;
