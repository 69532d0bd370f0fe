// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::Options;
use crate::errors::{Capability, NodeError};
use crate::graph::{EdgeId, Network, NodeCore, Phase};
use crate::tensor::Vec3i;
use crate::traits::{ComplexPass, FeaturemapAccess, InplacePass, RealPass, Trainable};

/// One stage of the graph: a group of channels at a fixed extent and batch
/// size.
///
/// Only [`Node::core`], [`Node::core_mut`], [`Node::zap`] and
/// [`Node::serialize`] are required. Every other operation either has a
/// working default built on [`NodeCore`] or reports
/// [`NodeError::Unsupported`].
pub trait Node: Send + Sync {
    fn core(&self) -> &NodeCore;

    fn core_mut(&mut self) -> &mut NodeCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn as_real(&self) -> Option<&dyn RealPass> {
        None
    }

    fn as_complex(&self) -> Option<&dyn ComplexPass> {
        None
    }

    fn as_inplace(&self) -> Option<&dyn InplacePass> {
        None
    }

    fn as_trainable(&self) -> Option<&dyn Trainable> {
        None
    }

    fn as_featuremaps(&self) -> Option<&dyn FeaturemapAccess> {
        None
    }

    fn attach_out_edge(&mut self, _slot: usize, _edge: EdgeId) -> Result<(), NodeError> {
        Err(NodeError::unsupported(self.name(), Capability::EdgeAttach))
    }

    fn attach_in_edge(&mut self, _slot: usize, _edge: EdgeId) -> Result<(), NodeError> {
        Err(NodeError::unsupported(self.name(), Capability::EdgeAttach))
    }

    /// Returns the buffer index of the size class `padded` on the output side.
    fn attach_out_fft_edge(&mut self, _slot: usize, _edge: EdgeId, _padded: Vec3i) -> Result<usize, NodeError> {
        Err(NodeError::unsupported(self.name(), Capability::FftEdgeAttach))
    }

    /// Returns the buffer index of the size class `padded` on the input side.
    fn attach_in_fft_edge(&mut self, _slot: usize, _edge: EdgeId, _padded: Vec3i) -> Result<usize, NodeError> {
        Err(NodeError::unsupported(self.name(), Capability::FftEdgeAttach))
    }

    /// Channel groups on the input side.
    fn num_in_nodes(&self) -> Result<usize, NodeError> {
        Err(NodeError::unsupported(self.name(), Capability::NodeCount))
    }

    /// Channel groups on the output side.
    fn num_out_nodes(&self) -> Result<usize, NodeError> {
        Err(NodeError::unsupported(self.name(), Capability::NodeCount))
    }

    /// Structural preparation before a pass. Dropout is decided separately
    /// by [`crate::graph::phase::stochastic_gate`].
    fn setup(&self, _net: &Network) -> Result<(), NodeError> {
        Ok(())
    }

    fn set_phase(&self, phase: Phase) {
        self.core().set_phase(phase);
    }

    /// Block until every task this node submitted has finished.
    fn wait(&self) -> Result<(), NodeError> {
        self.core().wait_pending().map(|_| ())
    }

    /// Release buffers. Only valid once [`Node::wait`] has returned.
    fn zap(&self);

    fn serialize(&self) -> Options;

    /// Enable or disable every channel group. Disabling cascades.
    fn enable(&self, net: &Network, on: bool) {
        net.enable_node(self.core().id(), on);
    }

    fn enable_slot(&self, net: &Network, slot: usize, on: bool) -> Result<(), NodeError> {
        net.enable_slot(self.core().id(), slot, on)
    }

    fn is_disabled(&self) -> bool {
        self.core().is_disabled()
    }
}
