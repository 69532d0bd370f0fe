// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::config::Options;
use crate::errors::{Capability, NodeError};
use crate::graph::join::Delivery;
use crate::graph::{EdgeId, Network, NodeCore, NodeLayout, NodeRole};
use crate::nodes::{describe, SlotStore};
use crate::tensor::ops::convolve_sparse_backward;
use crate::tensor::{Complex32, Cube, Tensor, Vec3i};
use crate::traits::{ComplexPass, FeaturemapAccess, InplacePass, Node, RealPass};

/// Entry point of the graph. The driver feeds each slot; the slot fans the
/// batch out to every enabled out-edge. Gradients coming back are summed
/// and kept for inspection.
#[derive(Debug)]
pub struct InputNodes {
    core: NodeCore,
    featuremaps: SlotStore,
    gradients: SlotStore,
}

impl InputNodes {
    /// The layout's role is forced to [`NodeRole::Input`].
    pub fn new(layout: NodeLayout, options: Options) -> Result<Self, NodeError> {
        let core = NodeCore::new(layout.with_role(NodeRole::Input), options)?;
        let size = core.size();
        Ok(Self {
            core,
            featuremaps: SlotStore::new(size),
            gradients: SlotStore::new(size),
        })
    }

    fn absorb_gradient(&self, slot: usize, delivery: Delivery) -> Result<(), NodeError> {
        if let Some(gradient) = self.core.deliver_backward(slot, delivery)? {
            self.gradients.put(slot, gradient);
        }
        Ok(())
    }
}

impl Node for InputNodes {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn as_real(&self) -> Option<&dyn RealPass> {
        Some(self)
    }

    fn as_complex(&self) -> Option<&dyn ComplexPass> {
        Some(self)
    }

    fn as_inplace(&self) -> Option<&dyn InplacePass> {
        Some(self)
    }

    fn as_featuremaps(&self) -> Option<&dyn FeaturemapAccess> {
        Some(self)
    }

    fn attach_out_edge(&mut self, slot: usize, edge: EdgeId) -> Result<(), NodeError> {
        self.core.attach_out(slot, edge)
    }

    fn attach_out_fft_edge(&mut self, slot: usize, edge: EdgeId, padded: Vec3i) -> Result<usize, NodeError> {
        self.core.attach_out_fft(slot, edge, padded)
    }

    fn num_in_nodes(&self) -> Result<usize, NodeError> {
        Ok(0)
    }

    fn num_out_nodes(&self) -> Result<usize, NodeError> {
        Ok(self.core.size())
    }

    fn zap(&self) {
        self.featuremaps.clear();
        self.gradients.clear();
        self.core.clear_joins();
    }

    fn serialize(&self) -> Options {
        describe(&self.core, "input")
    }
}

impl RealPass for InputNodes {
    fn forward(&self, net: &Arc<Network>, slot: usize, input: Tensor<f32>) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        self.core.check_batch(&input, self.core.fsize())?;
        if let Some(batch) = self.core.deliver_forward(slot, Delivery::Real(input))? {
            self.featuremaps.put(slot, batch.clone());
            self.core.dispatch_forward(net, slot, batch)?;
        }
        Ok(())
    }

    fn backward(&self, _net: &Arc<Network>, slot: usize, gradient: Tensor<f32>) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        self.core.check_batch(&gradient, self.core.fsize())?;
        self.absorb_gradient(slot, Delivery::Real(gradient))
    }
}

impl ComplexPass for InputNodes {
    fn forward(&self, _net: &Arc<Network>, _slot: usize, _buffer: usize, _input: Tensor<Complex32>) -> Result<(), NodeError> {
        Err(NodeError::unsupported(self.core.name(), Capability::ComplexPass))
    }

    fn backward(
        &self,
        _net: &Arc<Network>,
        slot: usize,
        buffer: usize,
        gradient: Tensor<Complex32>,
    ) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        let class = class_of(&self.core, self.core.fft_out_classes(), buffer)?;
        self.core.check_batch(&gradient, class)?;
        self.absorb_gradient(slot, Delivery::Spectral { buffer, data: gradient })
    }
}

impl InplacePass for InputNodes {
    fn forward(
        &self,
        _net: &Arc<Network>,
        _slot: usize,
        _featuremap: &Tensor<f32>,
        _filter: &Cube<f32>,
        _sparse: Vec3i,
    ) -> Result<(), NodeError> {
        Err(NodeError::unsupported(self.core.name(), Capability::InplacePass))
    }

    fn backward(
        &self,
        _net: &Arc<Network>,
        slot: usize,
        gradient: &Tensor<f32>,
        filter: &Cube<f32>,
        sparse: Vec3i,
    ) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        let fsize = self.core.fsize();
        let input_gradient = gradient
            .iter()
            .map(|g| convolve_sparse_backward(g, filter, sparse, fsize))
            .collect();
        self.absorb_gradient(slot, Delivery::Real(input_gradient))
    }
}

impl FeaturemapAccess for InputNodes {
    fn featuremaps(&self) -> Vec<Tensor<f32>> {
        self.featuremaps.snapshot(&self.core)
    }

    fn gradientmaps(&self) -> Vec<Tensor<f32>> {
        self.gradients.snapshot(&self.core)
    }
}

/// Look up the padded extent of a size-class buffer.
pub(crate) fn class_of(core: &NodeCore, classes: &[Vec3i], buffer: usize) -> Result<Vec3i, NodeError> {
    classes
        .get(buffer)
        .copied()
        .ok_or_else(|| NodeError::SlotOutOfRange {
            node: core.name().to_string(),
            slot: buffer,
            size: classes.len(),
        })
}
