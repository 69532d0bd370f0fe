// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Enable/disable propagation.
//!
//! Disabling cascades: a disabled slot switches off its incident edges, and
//! an edge going off can leave a neighbour slot with no enabled inputs
//! (cascade forward) or no enabled outputs (cascade backward). The cascade
//! only ever clears flags.
//!
//! Enabling is explicit and local. It turns the chosen slots back on,
//! reconnects edges whose other endpoint is enabled, and then settles the
//! node, which may cascade it off again if it is left without inputs or
//! outputs.

use std::collections::VecDeque;

use crate::graph::{Direction, EdgeId, Network, NodeId};
use crate::observability::messages::graph::SlotDisabled;
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy)]
enum Step {
    Slot {
        node: NodeId,
        slot: usize,
        cascade: Option<Direction>,
    },
    Edge(EdgeId),
}

/// Disable the given slots and everything that can no longer take part.
pub(crate) fn disable(net: &Network, node: NodeId, slots: impl IntoIterator<Item = usize>) {
    let work = slots
        .into_iter()
        .map(|slot| Step::Slot {
            node,
            slot,
            cascade: None,
        })
        .collect();
    drain(net, work);
}

/// Enable the given slots, reconnect their edges, then settle the node.
pub(crate) fn enable(net: &Network, node: NodeId, slots: impl IntoIterator<Item = usize>) {
    let core = net.node(node).core();
    for slot in slots {
        if core.set_enabled(slot, true) {
            continue;
        }
        for edge in core.in_edges(slot) {
            let src = net.edge(edge).core().src();
            if net.node(src.node).core().is_enabled(src.slot) {
                reconnect(net, edge);
            }
        }
        for edge in core.out_edges(slot) {
            let dst = net.edge(edge).core().dst();
            if net.node(dst.node).core().is_enabled(dst.slot) {
                reconnect(net, edge);
            }
        }
    }
    settle(net, [node]);
}

/// Everything back on, counts recomputed, then one settle sweep.
pub(crate) fn reset(net: &Network) {
    for edge in net.edges() {
        edge.core().set_enabled(true);
    }
    for node in net.nodes() {
        let core = node.core();
        for slot in 0..core.size() {
            core.set_enabled(slot, true);
            core.set_counts(slot, core.in_edges(slot).len(), core.out_edges(slot).len());
        }
    }
    settle(net, net.node_ids());
}

fn reconnect(net: &Network, edge: EdgeId) {
    let core = net.edge(edge).core();
    if core.set_enabled(true) {
        return;
    }
    let (src, dst) = (core.src(), core.dst());
    net.node(src.node).core().adjust_out(src.slot, true);
    net.node(dst.node).core().adjust_in(dst.slot, true);
}

/// Cascade off every enabled slot of `nodes` that has no enabled inputs
/// (unless fed by the driver) or no enabled outputs (unless read by it).
fn settle(net: &Network, nodes: impl IntoIterator<Item = NodeId>) {
    let mut work = VecDeque::new();
    for node in nodes {
        let core = net.node(node).core();
        for slot in 0..core.size() {
            if !core.is_enabled(slot) {
                continue;
            }
            if !core.is_input() && core.in_enabled(slot) == 0 {
                work.push_back(Step::Slot {
                    node,
                    slot,
                    cascade: Some(Direction::Forward),
                });
            } else if !core.is_output() && core.out_enabled(slot) == 0 {
                work.push_back(Step::Slot {
                    node,
                    slot,
                    cascade: Some(Direction::Backward),
                });
            }
        }
    }
    drain(net, work);
}

fn drain(net: &Network, mut work: VecDeque<Step>) {
    while let Some(step) = work.pop_front() {
        match step {
            Step::Slot {
                node,
                slot,
                cascade,
            } => {
                let core = net.node(node).core();
                if !core.set_enabled(slot, false) {
                    continue;
                }
                SlotDisabled {
                    node: core.name(),
                    slot,
                    cascade,
                }
                .log();
                for edge in core.in_edges(slot).into_iter().chain(core.out_edges(slot)) {
                    if net.edge(edge).core().is_enabled() {
                        work.push_back(Step::Edge(edge));
                    }
                }
            }
            Step::Edge(edge) => {
                let core = net.edge(edge).core();
                if !core.set_enabled(false) {
                    continue;
                }
                let (src, dst) = (core.src(), core.dst());

                let src_core = net.node(src.node).core();
                let outputs_left = src_core.adjust_out(src.slot, false);
                if outputs_left == 0 && !src_core.is_output() && src_core.is_enabled(src.slot) {
                    work.push_back(Step::Slot {
                        node: src.node,
                        slot: src.slot,
                        cascade: Some(Direction::Backward),
                    });
                }

                let dst_core = net.node(dst.node).core();
                let inputs_left = dst_core.adjust_in(dst.slot, false);
                if inputs_left == 0 && !dst_core.is_input() && dst_core.is_enabled(dst.slot) {
                    work.push_back(Step::Slot {
                        node: dst.node,
                        slot: dst.slot,
                        cascade: Some(Direction::Forward),
                    });
                }
            }
        }
    }
}
