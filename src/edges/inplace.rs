// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use crate::edges::take_cached;
use crate::errors::NodeError;
use crate::graph::Network;
use crate::optim::{Hyperparams, Parameter};
use crate::scheduler::lock;
use crate::tensor::ops::filter_gradient;
use crate::tensor::{Cube, Tensor, Vec3i};
use crate::traits::{Edge, EdgeCore, Trainable};

/// Legacy convolution edge: lends its filter to the endpoint node, which
/// performs the convolution itself. The edge only keeps and trains the
/// weights.
#[derive(Debug)]
pub struct InplaceFilterEdge {
    core: EdgeCore,
    sparse: Vec3i,
    filter: Mutex<Parameter>,
    last_input: Mutex<Option<Tensor<f32>>>,
    hyper: Hyperparams,
}

impl InplaceFilterEdge {
    pub fn new(core: EdgeCore, filter: Cube<f32>, sparse: Vec3i) -> Self {
        Self {
            core,
            sparse,
            filter: Mutex::new(Parameter::new(filter)),
            last_input: Mutex::new(None),
            hyper: Hyperparams::default(),
        }
    }

    pub fn filter(&self) -> Cube<f32> {
        lock(&self.filter).value().clone()
    }
}

impl Edge for InplaceFilterEdge {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "inplace"
    }

    fn forward(&self, net: &Arc<Network>, input: Tensor<f32>) -> Result<(), NodeError> {
        let filter = self.filter();
        let dst = self.core.dst();
        net.require_inplace(dst.node)?
            .forward(net, dst.slot, &input, &filter, self.sparse)?;
        *lock(&self.last_input) = Some(input);
        Ok(())
    }

    fn backward(&self, net: &Arc<Network>, gradient: Tensor<f32>) -> Result<(), NodeError> {
        let input = take_cached(&self.last_input, format!("{} {}", self.kind(), self.core.id()))?;

        // The node sees the weights the forward pass used.
        let filter = self.filter();
        let src = self.core.src();
        net.require_inplace(src.node)?
            .backward(net, src.slot, &gradient, &filter, self.sparse)?;

        let k = filter.size();
        let mut filter_grad = Cube::zeros(k);
        for (x, g) in input.iter().zip(gradient.iter()) {
            filter_grad.add_assign(&filter_gradient(x, g, k, self.sparse));
        }
        lock(&self.filter).update(&filter_grad, &self.hyper.snapshot());
        Ok(())
    }

    fn as_trainable(&self) -> Option<&dyn Trainable> {
        Some(&self.hyper)
    }

    fn zap(&self) {
        lock(&self.last_input).take();
    }
}
