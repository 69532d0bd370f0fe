// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Capability groups a node kind may implement.
//!
//! A kind exposes the groups it supports through the `as_*` accessors on
//! [`crate::traits::Node`]; everything else is reported as
//! [`crate::errors::NodeError::Unsupported`] by [`crate::graph::Network`].

use std::sync::Arc;

use crate::errors::NodeError;
use crate::graph::Network;
use crate::tensor::{Complex32, Cube, Tensor, Vec3i};

/// Spatial-domain passes. The tensor is moved into the node.
///
/// ```compile_fail
/// use std::sync::Arc;
/// use cubegraph::graph::Network;
/// use cubegraph::tensor::{Cube, Vec3i};
/// use cubegraph::traits::RealPass;
///
/// fn feed(net: &Arc<Network>, pass: &dyn RealPass) {
///     let batch = vec![Cube::<f32>::zeros(Vec3i::splat(2))];
///     let _ = pass.forward(net, 0, batch);
///     // The batch now belongs to the node.
///     let _ = batch.len();
/// }
/// ```
pub trait RealPass: Send + Sync {
    /// Receive a featuremap batch for input slot `slot`.
    fn forward(&self, net: &Arc<Network>, slot: usize, input: Tensor<f32>) -> Result<(), NodeError>;

    /// Receive a gradient batch for output slot `slot`.
    fn backward(&self, net: &Arc<Network>, slot: usize, gradient: Tensor<f32>) -> Result<(), NodeError>;
}

/// Frequency-domain passes. `buffer` is the size-class index handed out when
/// the delivering edge was attached. Shares the join counter with
/// [`RealPass`].
pub trait ComplexPass: Send + Sync {
    fn forward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        buffer: usize,
        input: Tensor<Complex32>,
    ) -> Result<(), NodeError>;

    fn backward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        buffer: usize,
        gradient: Tensor<Complex32>,
    ) -> Result<(), NodeError>;
}

/// Legacy passes where the edge lends its filter and the node convolves.
pub trait InplacePass: Send + Sync {
    fn forward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        featuremap: &Tensor<f32>,
        filter: &Cube<f32>,
        sparse: Vec3i,
    ) -> Result<(), NodeError>;

    fn backward(
        &self,
        net: &Arc<Network>,
        slot: usize,
        gradient: &Tensor<f32>,
        filter: &Cube<f32>,
        sparse: Vec3i,
    ) -> Result<(), NodeError>;
}

/// Hyperparameter control over trainable state.
pub trait Trainable: Send + Sync {
    fn set_eta(&self, eta: f32);
    fn set_momentum(&self, momentum: f32);
    fn set_weight_decay(&self, weight_decay: f32);
}

/// Snapshots of the last pass, one tensor per channel group.
pub trait FeaturemapAccess: Send + Sync {
    fn featuremaps(&self) -> Vec<Tensor<f32>>;
    fn gradientmaps(&self) -> Vec<Tensor<f32>>;
}
