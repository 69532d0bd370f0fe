// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use crate::edges::take_cached;
use crate::errors::NodeError;
use crate::graph::Network;
use crate::optim::{Hyperparams, Parameter};
use crate::scheduler::lock;
use crate::tensor::ops::{convolve_sparse_backward, convolve_sparse_valid, filter_gradient};
use crate::tensor::{Cube, Tensor, Vec3i};
use crate::traits::{Edge, EdgeCore, Trainable};

/// Spatial-domain sparse convolution with a trainable filter.
#[derive(Debug)]
pub struct FilterEdge {
    core: EdgeCore,
    sparse: Vec3i,
    filter: Mutex<Parameter>,
    last_input: Mutex<Option<Tensor<f32>>>,
    hyper: Hyperparams,
}

impl FilterEdge {
    pub fn new(core: EdgeCore, filter: Cube<f32>, sparse: Vec3i) -> Self {
        Self {
            core,
            sparse,
            filter: Mutex::new(Parameter::new(filter)),
            last_input: Mutex::new(None),
            hyper: Hyperparams::default(),
        }
    }

    /// Current filter weights.
    pub fn filter(&self) -> Cube<f32> {
        lock(&self.filter).value().clone()
    }
}

impl Edge for FilterEdge {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "filter"
    }

    fn forward(&self, net: &Arc<Network>, input: Tensor<f32>) -> Result<(), NodeError> {
        let output: Tensor<f32> = {
            let filter = lock(&self.filter);
            input
                .iter()
                .map(|cube| convolve_sparse_valid(cube, filter.value(), self.sparse))
                .collect()
        };
        *lock(&self.last_input) = Some(input);

        let dst = self.core.dst();
        net.require_real(dst.node)?.forward(net, dst.slot, output)
    }

    fn backward(&self, net: &Arc<Network>, gradient: Tensor<f32>) -> Result<(), NodeError> {
        let input = take_cached(&self.last_input, format!("{} {}", self.kind(), self.core.id()))?;
        let src = self.core.src();
        let input_size = net.node(src.node).core().fsize();

        let input_gradient: Tensor<f32> = {
            let mut filter = lock(&self.filter);
            let k = filter.value().size();
            let input_gradient = gradient
                .iter()
                .map(|g| convolve_sparse_backward(g, filter.value(), self.sparse, input_size))
                .collect();
            let mut filter_grad = Cube::zeros(k);
            for (x, g) in input.iter().zip(gradient.iter()) {
                filter_grad.add_assign(&filter_gradient(x, g, k, self.sparse));
            }
            filter.update(&filter_grad, &self.hyper.snapshot());
            input_gradient
        };

        net.require_real(src.node)?.backward(net, src.slot, input_gradient)
    }

    fn as_trainable(&self) -> Option<&dyn Trainable> {
        Some(&self.hyper)
    }

    fn zap(&self) {
        lock(&self.last_input).take();
    }
}
