// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::errors::NodeError;
use crate::graph::NodeId;
use crate::tensor::Vec3i;

/// Errors raised while assembling a network arena.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("no node named '{0}'")]
    UnknownName(String),

    #[error("duplicate node name: '{0}'")]
    DuplicateName(String),

    /// The edges form a cycle; the listed nodes could not be ordered.
    #[error("cyclic topology detected among: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("cannot connect '{src}' ({src_size:?}) to '{dst}' ({dst_size:?}): {reason}")]
    IncompatibleEndpoints {
        src: String,
        src_size: Vec3i,
        dst: String,
        dst_size: Vec3i,
        reason: String,
    },

    /// A node kind rejected one side of a connection after the other side
    /// was already attached; the builder cannot be used any more.
    #[error("builder left half-connected: {0}")]
    PartialAttach(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}
