// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The execution graph: arena, per-node state, joins, phases and the
//! enable/disable protocol.

mod ids;
pub mod join;
mod network;
mod node_core;
mod pending;
pub mod phase;
mod propagation;

#[cfg(test)]
mod integration_tests;

pub use ids::{Direction, EdgeId, NodeId, SlotRef};
pub use network::{Network, NetworkBuilder};
pub use node_core::{NodeCore, NodeLayout, NodeRole};
pub use phase::{stochastic_gate, Phase};
