// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reference edge kinds.

mod dummy;
mod fft_filter;
mod filter;
mod inplace;

pub use dummy::DummyEdge;
pub use fft_filter::FftFilterEdge;
pub use filter::FilterEdge;
pub use inplace::InplaceFilterEdge;

use crate::errors::NodeError;
use crate::scheduler::lock;
use crate::tensor::Tensor;
use std::sync::Mutex;

/// Take the input cached by the last forward pass, or report that backward
/// arrived without one.
fn take_cached<T>(cache: &Mutex<Option<Tensor<T>>>, label: String) -> Result<Tensor<T>, NodeError> {
    lock(cache).take().ok_or(NodeError::MissingForward(label))
}
