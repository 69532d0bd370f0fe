// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{Capability, NodeError};
use crate::graph::{EdgeId, Network, SlotRef};
use crate::tensor::{Complex32, Tensor};
use crate::traits::Trainable;

/// How an edge is wired into its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDomain {
    /// Carries real tensors; the edge applies its transform.
    Real,
    /// Carries spectra of one size class per endpoint.
    Spectral,
    /// Carries real tensors and lends its filter to the receiving node.
    Inplace,
}

/// Endpoints and enabled flag shared by every edge kind.
#[derive(Debug)]
pub struct EdgeCore {
    id: EdgeId,
    src: SlotRef,
    dst: SlotRef,
    domain: EdgeDomain,
    src_buffer: usize,
    dst_buffer: usize,
    enabled: AtomicBool,
}

impl EdgeCore {
    pub(crate) fn new(id: EdgeId, src: SlotRef, dst: SlotRef, domain: EdgeDomain) -> Self {
        Self {
            id,
            src,
            dst,
            domain,
            src_buffer: 0,
            dst_buffer: 0,
            enabled: AtomicBool::new(true),
        }
    }

    pub(crate) fn with_buffers(mut self, src_buffer: usize, dst_buffer: usize) -> Self {
        self.src_buffer = src_buffer;
        self.dst_buffer = dst_buffer;
        self
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn src(&self) -> SlotRef {
        self.src
    }

    pub fn dst(&self) -> SlotRef {
        self.dst
    }

    pub fn domain(&self) -> EdgeDomain {
        self.domain
    }

    /// Size-class index on the source node (spectral edges only).
    pub fn src_buffer(&self) -> usize {
        self.src_buffer
    }

    /// Size-class index on the destination node (spectral edges only).
    pub fn dst_buffer(&self) -> usize {
        self.dst_buffer
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub(crate) fn set_enabled(&self, on: bool) -> bool {
        self.enabled.swap(on, Ordering::AcqRel)
    }
}

/// Connector and transform between one source slot and one destination slot.
pub trait Edge: Send + Sync {
    fn core(&self) -> &EdgeCore;

    /// Short kind label used in errors and logs.
    fn kind(&self) -> &'static str;

    fn forward(&self, _net: &Arc<Network>, _input: Tensor<f32>) -> Result<(), NodeError> {
        Err(self.unsupported(Capability::RealPass))
    }

    fn backward(&self, _net: &Arc<Network>, _gradient: Tensor<f32>) -> Result<(), NodeError> {
        Err(self.unsupported(Capability::RealPass))
    }

    fn forward_fft(&self, _net: &Arc<Network>, _input: &Tensor<Complex32>) -> Result<(), NodeError> {
        Err(self.unsupported(Capability::SpectralEdge))
    }

    fn backward_fft(&self, _net: &Arc<Network>, _gradient: &Tensor<Complex32>) -> Result<(), NodeError> {
        Err(self.unsupported(Capability::SpectralEdge))
    }

    fn as_trainable(&self) -> Option<&dyn Trainable> {
        None
    }

    /// Release cached tensors.
    fn zap(&self) {}

    fn unsupported(&self, capability: Capability) -> NodeError {
        NodeError::unsupported(format!("{} {}", self.kind(), self.core().id()), capability)
    }
}
