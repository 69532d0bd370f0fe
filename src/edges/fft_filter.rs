// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use crate::edges::take_cached;
use crate::errors::NodeError;
use crate::graph::Network;
use crate::optim::{Hyperparams, Parameter};
use crate::scheduler::lock;
use crate::tensor::fft::{forward_padded, inverse_cropped, multiply_conj};
use crate::tensor::{Complex32, Cube, Tensor, Vec3i};
use crate::traits::{Edge, EdgeCore, Trainable};

struct Weights {
    spatial: Parameter,
    spectrum: Cube<Complex32>,
}

/// Dense convolution carried out as an element-wise product in frequency
/// space. Input spectra arrive already transformed at the source's size
/// class; the destination brings the product back to its own extent.
pub struct FftFilterEdge {
    core: EdgeCore,
    class: Vec3i,
    weights: Mutex<Weights>,
    last_input: Mutex<Option<Tensor<Complex32>>>,
    hyper: Hyperparams,
}

impl FftFilterEdge {
    /// `class` is the padded extent shared by both endpoints' buffers.
    pub fn new(core: EdgeCore, filter: Cube<f32>, class: Vec3i) -> Self {
        let spectrum = forward_padded(&filter, class, Vec3i::default());
        Self {
            core,
            class,
            weights: Mutex::new(Weights {
                spatial: Parameter::new(filter),
                spectrum,
            }),
            last_input: Mutex::new(None),
            hyper: Hyperparams::default(),
        }
    }

    pub fn filter(&self) -> Cube<f32> {
        lock(&self.weights).spatial.value().clone()
    }

    pub fn class(&self) -> Vec3i {
        self.class
    }
}

impl std::fmt::Debug for FftFilterEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftFilterEdge")
            .field("core", &self.core)
            .field("class", &self.class)
            .finish()
    }
}

impl Edge for FftFilterEdge {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn kind(&self) -> &'static str {
        "fft-filter"
    }

    fn forward_fft(&self, net: &Arc<Network>, input: &Tensor<Complex32>) -> Result<(), NodeError> {
        let output: Tensor<Complex32> = {
            let weights = lock(&self.weights);
            input.iter().map(|x| x.hadamard(&weights.spectrum)).collect()
        };
        *lock(&self.last_input) = Some(input.clone());

        let dst = self.core.dst();
        net.require_complex(dst.node)?
            .forward(net, dst.slot, self.core.dst_buffer(), output)
    }

    fn backward_fft(&self, net: &Arc<Network>, gradient: &Tensor<Complex32>) -> Result<(), NodeError> {
        let input = take_cached(&self.last_input, format!("{} {}", self.kind(), self.core.id()))?;

        let input_gradient: Tensor<Complex32> = {
            let mut guard = lock(&self.weights);
            let weights = &mut *guard;
            let input_gradient = gradient
                .iter()
                .map(|g| multiply_conj(g, &weights.spectrum))
                .collect();

            let k = weights.spatial.value().size();
            let mut filter_grad = Cube::zeros(k);
            for (x, g) in input.iter().zip(gradient.iter()) {
                filter_grad.add_assign(&inverse_cropped(&multiply_conj(g, x), Vec3i::default(), k));
            }
            weights.spatial.update(&filter_grad, &self.hyper.snapshot());
            weights.spectrum = forward_padded(weights.spatial.value(), self.class, Vec3i::default());
            input_gradient
        };

        let src = self.core.src();
        net.require_complex(src.node)?
            .backward(net, src.slot, self.core.src_buffer(), input_gradient)
    }

    fn as_trainable(&self) -> Option<&dyn Trainable> {
        Some(&self.hyper)
    }

    fn zap(&self) {
        lock(&self.last_input).take();
    }
}
