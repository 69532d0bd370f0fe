// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for node and edge operations during passes and control calls.

use std::fmt;

use thiserror::Error;

use crate::errors::{OptionsError, TaskError};
use crate::tensor::Vec3i;

/// Capability groups a node or edge kind may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    RealPass,
    ComplexPass,
    InplacePass,
    Trainable,
    Featuremaps,
    EdgeAttach,
    FftEdgeAttach,
    NodeCount,
    SpectralEdge,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Capability::RealPass => "real-domain pass",
            Capability::ComplexPass => "frequency-domain pass",
            Capability::InplacePass => "inplace convolution pass",
            Capability::Trainable => "hyperparameter control",
            Capability::Featuremaps => "featuremap access",
            Capability::EdgeAttach => "edge attachment",
            Capability::FftEdgeAttach => "fft edge attachment",
            Capability::NodeCount => "node count query",
            Capability::SpectralEdge => "spectral edge pass",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum NodeError {
    /// A capability the concrete kind does not implement was invoked.
    /// This is a dispatch or graph-construction bug, never retried.
    #[error("'{node}' does not support {capability}")]
    Unsupported { node: String, capability: Capability },

    #[error("'{node}' has {size} channel groups, slot {slot} is out of range")]
    SlotOutOfRange {
        node: String,
        slot: usize,
        size: usize,
    },

    /// More deliveries arrived at a join than its enabled edges allow.
    #[error("'{node}' slot {slot} received delivery {arrived} but expects {expected}")]
    JoinInconsistency {
        node: String,
        slot: usize,
        arrived: usize,
        expected: usize,
    },

    #[error("'{node}' expected extent {expected:?}, got {actual:?}")]
    ShapeMismatch {
        node: String,
        expected: Vec3i,
        actual: Vec3i,
    },

    #[error("'{node}' expected a batch of {expected} cubes, got {actual}")]
    BatchMismatch {
        node: String,
        expected: usize,
        actual: usize,
    },

    /// A backward pass reached an edge that has no cached forward input.
    #[error("'{0}' received a backward pass without a preceding forward pass")]
    MissingForward(String),

    /// The node was never added to a network, so it has no scheduler.
    #[error("'{0}' is not attached to a network")]
    Detached(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Options(#[from] OptionsError),
}

impl NodeError {
    pub fn unsupported(node: impl Into<String>, capability: Capability) -> Self {
        NodeError::Unsupported {
            node: node.into(),
            capability,
        }
    }
}
