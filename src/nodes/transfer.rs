// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use crate::config::Options;
use crate::errors::{NodeError, OptionsError};
use crate::graph::join::Delivery;
use crate::graph::{EdgeId, Network, NodeCore, NodeLayout};
use crate::nodes::input::class_of;
use crate::nodes::{describe, SlotStore};
use crate::optim::Hyperparams;
use crate::scheduler::lock;
use crate::tensor::ops::{convolve_sparse_backward, convolve_sparse_valid};
use crate::tensor::{Complex32, Cube, Tensor, Vec3i};
use crate::traits::{ComplexPass, FeaturemapAccess, InplacePass, Node, RealPass, Trainable};

const FUNCTION_KEY: &str = "function";
const BIAS_KEY: &str = "bias";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Linear,
    Relu,
}

impl Activation {
    pub fn from_options(options: &Options) -> Result<Self, OptionsError> {
        match options.optional_as::<String>(FUNCTION_KEY)?.as_deref() {
            None | Some("linear") => Ok(Activation::Linear),
            Some("relu") => Ok(Activation::Relu),
            Some(other) => Err(OptionsError::UnknownValue {
                key: FUNCTION_KEY.to_string(),
                value: other.to_string(),
            }),
        }
    }

    fn apply(self, v: f32) -> f32 {
        match self {
            Activation::Linear => v,
            Activation::Relu => v.max(0.0),
        }
    }

    /// Derivative expressed through the activation's output.
    fn slope(self, output: f32) -> f32 {
        match self {
            Activation::Linear => 1.0,
            Activation::Relu if output > 0.0 => 1.0,
            Activation::Relu => 0.0,
        }
    }
}

#[derive(Debug)]
struct Biases {
    values: Vec<f32>,
    velocity: Vec<f32>,
}

/// Summing node: every slot adds its incoming deliveries, applies a bias
/// and an element-wise function, and fans the result out. In the output
/// role the result is kept as the featuremap instead.
///
/// Options: `function` (`linear` | `relu`, default linear), `bias`
/// (initial value for every slot, default 0).
#[derive(Debug)]
pub struct TransferNodes {
    core: NodeCore,
    activation: Activation,
    biases: Mutex<Biases>,
    hyper: Hyperparams,
    featuremaps: SlotStore,
    gradients: SlotStore,
}

impl TransferNodes {
    pub fn new(layout: NodeLayout, options: Options) -> Result<Self, NodeError> {
        let activation = Activation::from_options(&options)?;
        let bias = options.optional_as::<f32>(BIAS_KEY)?.unwrap_or(0.0);
        let core = NodeCore::new(layout, options)?;
        let size = core.size();
        Ok(Self {
            core,
            activation,
            biases: Mutex::new(Biases {
                values: vec![bias; size],
                velocity: vec![0.0; size],
            }),
            hyper: Hyperparams::default(),
            featuremaps: SlotStore::new(size),
            gradients: SlotStore::new(size),
        })
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn biases(&self) -> Vec<f32> {
        lock(&self.biases).values.clone()
    }

    fn fire_forward(&self, net: &Arc<Network>, slot: usize, sum: Tensor<f32>) -> Result<(), NodeError> {
        let bias = lock(&self.biases).values[slot];
        let activation = self.activation;
        let output: Tensor<f32> = sum
            .iter()
            .map(|cube| cube.map(|v| activation.apply(v + bias)))
            .collect();

        if self.core.is_output() {
            self.featuremaps.put(slot, output);
            return Ok(());
        }
        self.featuremaps.put(slot, output.clone());
        self.core.dispatch_forward(net, slot, output)
    }

    fn fire_backward(&self, net: &Arc<Network>, slot: usize, gradient: Tensor<f32>) -> Result<(), NodeError> {
        let activation = self.activation;
        let gradient: Tensor<f32> = match (activation, self.featuremaps.get(slot)) {
            (Activation::Relu, Some(outputs)) => gradient
                .iter()
                .zip(outputs.iter())
                .map(|(g, a)| g.hadamard(&a.map(|v| activation.slope(v))))
                .collect(),
            _ => gradient,
        };

        let bias_grad: f32 = gradient.iter().map(Cube::sum).sum();
        {
            let mut guard = lock(&self.biases);
            let biases = &mut *guard;
            self.hyper.snapshot().step(
                &mut biases.values[slot..=slot],
                &mut biases.velocity[slot..=slot],
                &[bias_grad],
            );
        }

        if self.core.is_input() {
            self.gradients.put(slot, gradient);
            return Ok(());
        }
        self.gradients.put(slot, gradient.clone());
        self.core.dispatch_backward(net, slot, gradient)
    }

    fn absorb_forward(&self, net: &Arc<Network>, slot: usize, delivery: Delivery) -> Result<(), NodeError> {
        match self.core.deliver_forward(slot, delivery)? {
            Some(sum) => self.fire_forward(net, slot, sum),
            None => Ok(()),
        }
    }

    fn absorb_backward(&self, net: &Arc<Network>, slot: usize, delivery: Delivery) -> Result<(), NodeError> {
        match self.core.deliver_backward(slot, delivery)? {
            Some(gradient) => self.fire_backward(net, slot, gradient),
            None => Ok(()),
        }
    }
}

impl Node for TransferNodes {
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

    fn as_trainable(&self) -> Option<&dyn Trainable> {
        Some(&self.hyper)
    }

    fn as_featuremaps(&self) -> Option<&dyn FeaturemapAccess> {
        Some(self)
    }

    fn attach_out_edge(&mut self, slot: usize, edge: EdgeId) -> Result<(), NodeError> {
        self.core.attach_out(slot, edge)
    }

    fn attach_in_edge(&mut self, slot: usize, edge: EdgeId) -> Result<(), NodeError> {
        self.core.attach_in(slot, edge)
    }

    fn attach_out_fft_edge(&mut self, slot: usize, edge: EdgeId, padded: Vec3i) -> Result<usize, NodeError> {
        self.core.attach_out_fft(slot, edge, padded)
    }

    fn attach_in_fft_edge(&mut self, slot: usize, edge: EdgeId, padded: Vec3i) -> Result<usize, NodeError> {
        self.core.attach_in_fft(slot, edge, padded)
    }

    fn num_in_nodes(&self) -> Result<usize, NodeError> {
        Ok(self.core.size())
    }

    fn num_out_nodes(&self) -> Result<usize, NodeError> {
        Ok(self.core.size())
    }

    /// Forget the previous sample's maps before a new pass.
    fn setup(&self, _net: &Network) -> Result<(), NodeError> {
        self.featuremaps.clear();
        self.gradients.clear();
        Ok(())
    }

    fn zap(&self) {
        self.featuremaps.clear();
        self.gradients.clear();
        self.core.clear_joins();
    }

    fn serialize(&self) -> Options {
        let mut options = describe(&self.core, "transfer");
        options.insert("biases", self.biases());
        options
    }
}

impl RealPass for TransferNodes {
    fn forward(&self, net: &Arc<Network>, slot: usize, input: Tensor<f32>) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        self.core.check_batch(&input, self.core.fsize())?;
        self.absorb_forward(net, slot, Delivery::Real(input))
    }

    fn backward(&self, net: &Arc<Network>, slot: usize, gradient: Tensor<f32>) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        self.core.check_batch(&gradient, self.core.fsize())?;
        self.absorb_backward(net, slot, Delivery::Real(gradient))
    }
}

impl ComplexPass for TransferNodes {
    fn forward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        buffer: usize,
        input: Tensor<Complex32>,
    ) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        let class = class_of(&self.core, self.core.fft_in_classes(), buffer)?;
        self.core.check_batch(&input, class)?;
        self.absorb_forward(net, slot, Delivery::Spectral { buffer, data: input })
    }

    fn backward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        buffer: usize,
        gradient: Tensor<Complex32>,
    ) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        let class = class_of(&self.core, self.core.fft_out_classes(), buffer)?;
        self.core.check_batch(&gradient, class)?;
        self.absorb_backward(net, slot, Delivery::Spectral { buffer, data: gradient })
    }
}

impl InplacePass for TransferNodes {
    fn forward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        featuremap: &Tensor<f32>,
        filter: &Cube<f32>,
        sparse: Vec3i,
    ) -> Result<(), NodeError> {
        self.core.check_slot(slot)?;
        let output: Tensor<f32> = featuremap
            .iter()
            .map(|cube| convolve_sparse_valid(cube, filter, sparse))
            .collect();
        self.core.check_batch(&output, self.core.fsize())?;
        self.absorb_forward(net, slot, Delivery::Real(output))
    }

    fn backward(
        &self,
        net: &Arc<Network>,
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
        self.absorb_backward(net, slot, Delivery::Real(input_gradient))
    }
}

impl FeaturemapAccess for TransferNodes {
    fn featuremaps(&self) -> Vec<Tensor<f32>> {
        self.featuremaps.snapshot(&self.core)
    }

    fn gradientmaps(&self) -> Vec<Tensor<f32>> {
        self.gradients.snapshot(&self.core)
    }
}
