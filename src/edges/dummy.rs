// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::errors::NodeError;
use crate::graph::Network;
use crate::tensor::Tensor;
use crate::traits::{Edge, EdgeCore};

/// Identity connection between two slots of equal extent.
#[derive(Debug)]
pub struct DummyEdge {
    core: EdgeCore,
}

impl DummyEdge {
    pub fn new(core: EdgeCore) -> Self {
        Self { core }
    }
}

impl Edge for DummyEdge {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "dummy"
    }

    fn forward(&self, net: &Arc<Network>, input: Tensor<f32>) -> Result<(), NodeError> {
        let dst = self.core.dst();
        net.require_real(dst.node)?.forward(net, dst.slot, input)
    }

    fn backward(&self, net: &Arc<Network>, gradient: Tensor<f32>) -> Result<(), NodeError> {
        let src = self.core.src();
        net.require_real(src.node)?.backward(net, src.slot, gradient)
    }
}
