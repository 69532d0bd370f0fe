// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The network arena.
//!
//! Nodes and edges live in two vectors owned by [`Network`] and refer to
//! each other through [`NodeId`] and [`EdgeId`]. Tasks hold an
//! `Arc<Network>` so an edge can call back into its neighbour's pass
//! capability from a worker thread.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use crate::config::{Options, TrainingConfig};
use crate::edges::{DummyEdge, FftFilterEdge, FilterEdge, InplaceFilterEdge};
use crate::errors::{Capability, GraphError, NodeError};
use crate::graph::phase::stochastic_gate;
use crate::graph::{propagation, Direction, EdgeId, NodeId, Phase, SlotRef};
use crate::observability::messages::graph::{PassCompleted, PassStarted, PhaseChanged};
use crate::observability::messages::StructuredLog;
use crate::samples::{Blobs, InOutLayout};
use crate::scheduler::TaskManager;
use crate::tensor::ops::valid_extent;
use crate::tensor::{Cube, Tensor, Vec3i};
use crate::traits::{
    ComplexPass, Edge, EdgeCore, EdgeDomain, FeaturemapAccess, InplacePass, Node, RealPass, Trainable,
};

pub struct Network {
    nodes: Vec<Box<dyn Node>>,
    edges: Vec<Box<dyn Edge>>,
    names: BTreeMap<String, NodeId>,
    order: Vec<NodeId>,
    scheduler: Arc<TaskManager>,
    phase: AtomicU8,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("nodes", &self.names.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.len())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Network {
    // ---- arena access ----

    pub fn node(&self, id: NodeId) -> &dyn Node {
        self.nodes[id.0].as_ref()
    }

    pub fn edge(&self, id: EdgeId) -> &dyn Edge {
        self.edges[id.0].as_ref()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &dyn Node> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn edges(&self) -> impl Iterator<Item = &dyn Edge> {
        self.edges.iter().map(|e| e.as_ref())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Node ids ordered so every edge goes from an earlier to a later node.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn scheduler(&self) -> &Arc<TaskManager> {
        &self.scheduler
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn input_nodes(&self) -> Vec<NodeId> {
        self.node_ids().filter(|&id| self.node(id).core().is_input()).collect()
    }

    pub fn output_nodes(&self) -> Vec<NodeId> {
        self.node_ids().filter(|&id| self.node(id).core().is_output()).collect()
    }

    // ---- capabilities ----

    pub fn require_real(&self, id: NodeId) -> Result<&dyn RealPass, NodeError> {
        let node = self.node(id);
        node.as_real()
            .ok_or_else(|| NodeError::unsupported(node.name(), Capability::RealPass))
    }

    pub fn require_complex(&self, id: NodeId) -> Result<&dyn ComplexPass, NodeError> {
        let node = self.node(id);
        node.as_complex()
            .ok_or_else(|| NodeError::unsupported(node.name(), Capability::ComplexPass))
    }

    pub fn require_inplace(&self, id: NodeId) -> Result<&dyn InplacePass, NodeError> {
        let node = self.node(id);
        node.as_inplace()
            .ok_or_else(|| NodeError::unsupported(node.name(), Capability::InplacePass))
    }

    pub fn require_trainable(&self, id: NodeId) -> Result<&dyn Trainable, NodeError> {
        let node = self.node(id);
        node.as_trainable()
            .ok_or_else(|| NodeError::unsupported(node.name(), Capability::Trainable))
    }

    pub fn require_featuremaps(&self, id: NodeId) -> Result<&dyn FeaturemapAccess, NodeError> {
        let node = self.node(id);
        node.as_featuremaps()
            .ok_or_else(|| NodeError::unsupported(node.name(), Capability::Featuremaps))
    }

    // ---- phase and setup ----

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Switch every node to `phase`. All flags are reset first, so nothing
    /// dropped in a previous phase stays disabled.
    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
        self.reset_enabled();
        for node in self.nodes() {
            node.set_phase(phase);
        }
        PhaseChanged {
            phase,
            node_count: self.nodes.len(),
        }
        .log();
    }

    /// Structural setup of every node, then the dropout gate of every node
    /// in id order.
    pub fn setup<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(), NodeError> {
        for node in self.nodes() {
            node.setup(self)?;
        }
        for id in self.node_ids() {
            stochastic_gate(self, id, rng)?;
        }
        Ok(())
    }

    /// Prepare the next training sample: reset all flags, then [`Self::setup`].
    /// Outside [`Phase::Train`] this does nothing, leaving the flags as
    /// they are.
    pub fn begin_pass<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(), NodeError> {
        if self.phase() != Phase::Train {
            return Ok(());
        }
        self.reset_enabled();
        self.setup(rng)
    }

    /// Every slot and edge back on, then disable whatever is left without
    /// inputs or outputs.
    pub fn reset_enabled(&self) {
        propagation::reset(self);
    }

    // ---- enable / disable ----

    pub fn enable_node(&self, id: NodeId, on: bool) {
        let slots = 0..self.node(id).core().size();
        if on {
            propagation::enable(self, id, slots);
        } else {
            propagation::disable(self, id, slots);
        }
    }

    pub fn enable_slot(&self, id: NodeId, slot: usize, on: bool) -> Result<(), NodeError> {
        self.node(id).core().check_slot(slot)?;
        if on {
            propagation::enable(self, id, [slot]);
        } else {
            propagation::disable(self, id, [slot]);
        }
        Ok(())
    }

    pub fn disabled_nodes(&self) -> Vec<NodeId> {
        self.node_ids().filter(|&id| self.node(id).is_disabled()).collect()
    }

    // ---- passes ----

    /// Feed one slot of a node in the forward direction. Returns `false`
    /// without submitting anything when the node or the slot is disabled.
    pub fn forward(self: &Arc<Self>, id: NodeId, slot: usize, input: Tensor<f32>) -> Result<bool, NodeError> {
        let node = self.node(id);
        node.core().check_slot(slot)?;
        if node.is_disabled() || !node.core().is_enabled(slot) {
            return Ok(false);
        }
        self.require_real(id)?.forward(self, slot, input)?;
        Ok(true)
    }

    /// Feed one slot of a node in the backward direction.
    pub fn backward(self: &Arc<Self>, id: NodeId, slot: usize, gradient: Tensor<f32>) -> Result<bool, NodeError> {
        let node = self.node(id);
        node.core().check_slot(slot)?;
        if node.is_disabled() || !node.core().is_enabled(slot) {
            return Ok(false);
        }
        self.require_real(id)?.backward(self, slot, gradient)?;
        Ok(true)
    }

    /// Feed a named sample into the input nodes. Each blob holds
    /// `size * batch_size` cubes, slot-major. Returns the number of slots
    /// that accepted work.
    pub fn forward_sample(self: &Arc<Self>, sample: &Blobs) -> Result<usize, GraphError> {
        self.feed(sample, Direction::Forward)
    }

    /// Feed a named gradient into the output nodes.
    pub fn backward_sample(self: &Arc<Self>, gradient: &Blobs) -> Result<usize, GraphError> {
        self.feed(gradient, Direction::Backward)
    }

    fn feed(self: &Arc<Self>, blobs: &Blobs, direction: Direction) -> Result<usize, GraphError> {
        // Check every blob before submitting any, so a bad sample leaves no
        // partial sums behind.
        let mut checked = Vec::with_capacity(blobs.len());
        for (name, cubes) in blobs {
            let id = self.find(name).ok_or_else(|| GraphError::UnknownName(name.clone()))?;
            let core = self.node(id).core();
            let batch = core.batch_size();
            if cubes.len() != core.size() * batch {
                return Err(NodeError::BatchMismatch {
                    node: name.clone(),
                    expected: core.size() * batch,
                    actual: cubes.len(),
                }
                .into());
            }
            if let Some(cube) = cubes.iter().find(|c| c.size() != core.fsize()) {
                return Err(NodeError::ShapeMismatch {
                    node: name.clone(),
                    expected: core.fsize(),
                    actual: cube.size(),
                }
                .into());
            }
            checked.push((id, batch.max(1), cubes));
        }

        let mut fed = 0;
        for (id, batch, cubes) in checked {
            for (slot, chunk) in cubes.chunks(batch).enumerate() {
                let accepted = match direction {
                    Direction::Forward => self.forward(id, slot, chunk.to_vec())?,
                    Direction::Backward => self.backward(id, slot, chunk.to_vec())?,
                };
                fed += usize::from(accepted);
            }
        }
        Ok(fed)
    }

    /// Featuremaps of every output node, flattened slot-major.
    pub fn outputs(&self) -> Blobs {
        self.collect(self.output_nodes(), |maps| maps.featuremaps())
    }

    /// Accumulated gradients of every input node, flattened slot-major.
    pub fn input_gradients(&self) -> Blobs {
        self.collect(self.input_nodes(), |maps| maps.gradientmaps())
    }

    fn collect(&self, ids: Vec<NodeId>, read: impl Fn(&dyn FeaturemapAccess) -> Vec<Tensor<f32>>) -> Blobs {
        ids.into_iter()
            .filter_map(|id| {
                let node = self.node(id);
                let maps = node.as_featuremaps()?;
                let cubes: Vec<Cube<f32>> = read(maps).into_iter().flatten().collect();
                Some((node.name().to_string(), cubes))
            })
            .collect()
    }

    /// Block until no node has outstanding work. Tasks may submit further
    /// tasks while this runs, so nodes are swept until a full sweep finds
    /// nothing pending. The first failure is returned; later ones go to the
    /// scheduler's error sink.
    pub fn wait(&self) -> Result<(), NodeError> {
        let mut first = None;
        loop {
            let mut idle = true;
            for node in self.nodes() {
                if !node.core().has_pending() {
                    continue;
                }
                idle = false;
                let (_, failures) = node.core().wait_failures();
                for (priority, err) in failures {
                    if first.is_none() {
                        first = Some(NodeError::Task(err));
                    } else {
                        self.scheduler.sink().report(priority, err);
                    }
                }
            }
            if idle {
                break;
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Drop every partial join sum. Only meaningful once [`Self::wait`] has
    /// returned; the next delivery at any join starts a fresh sample.
    pub fn clear_joins(&self) {
        for node in self.nodes() {
            node.core().clear_joins();
        }
    }

    /// Forward one sample and wait for it to settle.
    pub fn run_forward(self: &Arc<Self>, sample: &Blobs) -> Result<(), GraphError> {
        self.run(sample, Direction::Forward)
    }

    /// Backward one gradient and wait for it to settle.
    pub fn run_backward(self: &Arc<Self>, gradient: &Blobs) -> Result<(), GraphError> {
        self.run(gradient, Direction::Backward)
    }

    fn run(self: &Arc<Self>, blobs: &Blobs, direction: Direction) -> Result<(), GraphError> {
        let start_msg = PassStarted {
            direction,
            blobs: blobs.len(),
        };
        let span = start_msg.span("network_pass");
        let _guard = span.enter();
        start_msg.log();

        let started = Instant::now();
        let fed = self.feed(blobs, direction);
        // Whatever was submitted before a feed error still has to finish.
        let waited = self.wait();
        if fed.is_err() || waited.is_err() {
            self.clear_joins();
        }
        fed?;
        waited?;
        PassCompleted {
            direction,
            disabled_nodes: self.disabled_nodes().len(),
            duration: started.elapsed(),
        }
        .log();
        Ok(())
    }

    // ---- training controls ----

    fn trainables(&self) -> impl Iterator<Item = &dyn Trainable> {
        self.nodes()
            .filter_map(|n| n.as_trainable())
            .chain(self.edges().filter_map(|e| e.as_trainable()))
    }

    pub fn set_eta(&self, eta: f32) {
        self.trainables().for_each(|t| t.set_eta(eta));
    }

    pub fn set_momentum(&self, momentum: f32) {
        self.trainables().for_each(|t| t.set_momentum(momentum));
    }

    pub fn set_weight_decay(&self, weight_decay: f32) {
        self.trainables().for_each(|t| t.set_weight_decay(weight_decay));
    }

    pub fn apply_training(&self, training: &TrainingConfig) {
        self.set_eta(training.get_eta());
        self.set_momentum(training.get_momentum());
        self.set_weight_decay(training.get_weight_decay());
    }

    /// Wait for outstanding work, then release every cached tensor.
    pub fn zap(&self) -> Result<(), NodeError> {
        self.wait()?;
        self.nodes().for_each(|n| n.zap());
        self.edges().for_each(|e| e.zap());
        Ok(())
    }

    /// Configuration snapshot of every node in id order.
    pub fn serialize(&self) -> Vec<Options> {
        self.nodes().map(|n| n.serialize()).collect()
    }

    fn blob_layout(&self, ids: Vec<NodeId>) -> BTreeMap<String, (Vec3i, usize)> {
        ids.into_iter()
            .map(|id| {
                let core = self.node(id).core();
                (core.name().to_string(), (core.fsize(), core.size() * core.batch_size()))
            })
            .collect()
    }
}

impl InOutLayout for Network {
    /// Input node name to (extent, cubes per sample).
    fn inputs(&self) -> BTreeMap<String, (Vec3i, usize)> {
        self.blob_layout(self.input_nodes())
    }

    fn outputs(&self) -> BTreeMap<String, (Vec3i, usize)> {
        self.blob_layout(self.output_nodes())
    }
}

/// Collects nodes and edges, validates every connection, and orders the
/// result.
pub struct NetworkBuilder {
    scheduler: Arc<TaskManager>,
    nodes: Vec<Box<dyn Node>>,
    edges: Vec<Box<dyn Edge>>,
    names: BTreeMap<String, NodeId>,
    broken: Option<String>,
}

impl NetworkBuilder {
    pub fn new(scheduler: Arc<TaskManager>) -> Self {
        Self {
            scheduler,
            nodes: Vec::new(),
            edges: Vec::new(),
            names: BTreeMap::new(),
            broken: None,
        }
    }

    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> Result<NodeId, GraphError> {
        self.add_boxed(Box::new(node))
    }

    pub fn add_boxed(&mut self, mut node: Box<dyn Node>) -> Result<NodeId, GraphError> {
        let name = node.name().to_string();
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        let id = NodeId(self.nodes.len());
        node.core_mut().bind(id, Arc::clone(&self.scheduler));
        self.names.insert(name, id);
        self.nodes.push(node);
        Ok(id)
    }

    fn get(&self, id: NodeId) -> Result<&dyn Node, GraphError> {
        self.nodes
            .get(id.0)
            .map(|n| n.as_ref())
            .ok_or(GraphError::UnknownNode(id))
    }

    fn incompatible(&self, src: SlotRef, dst: SlotRef, reason: impl Into<String>) -> GraphError {
        let (s, d) = (self.nodes[src.node.0].core(), self.nodes[dst.node.0].core());
        GraphError::IncompatibleEndpoints {
            src: s.name().to_string(),
            src_size: s.fsize(),
            dst: d.name().to_string(),
            dst_size: d.fsize(),
            reason: reason.into(),
        }
    }

    /// Wire `src` to `dst` with an edge built by `make`. Spectral edges get
    /// the source extent as their size class on both endpoints.
    pub fn connect_with<F>(&mut self, src: SlotRef, dst: SlotRef, domain: EdgeDomain, make: F) -> Result<EdgeId, GraphError>
    where
        F: FnOnce(EdgeCore) -> Box<dyn Edge>,
    {
        let (s, d) = (self.get(src.node)?.core(), self.get(dst.node)?.core());
        s.check_slot(src.slot)?;
        d.check_slot(dst.slot)?;
        if src.node == dst.node {
            return Err(self.incompatible(src, dst, "an edge cannot loop back to its own node"));
        }
        if s.batch_size() != d.batch_size() {
            return Err(self.incompatible(src, dst, "batch sizes differ"));
        }
        let class = s.fsize();
        if domain == EdgeDomain::Spectral && !class.covers(d.fsize()) {
            return Err(self.incompatible(src, dst, "destination is larger than the size class"));
        }

        let id = EdgeId(self.edges.len());
        let core = match domain {
            EdgeDomain::Real | EdgeDomain::Inplace => {
                self.nodes[src.node.0].attach_out_edge(src.slot, id)?;
                self.nodes[dst.node.0]
                    .attach_in_edge(dst.slot, id)
                    .map_err(|e| self.poison(e))?;
                EdgeCore::new(id, src, dst, domain)
            }
            EdgeDomain::Spectral => {
                let src_buffer = self.nodes[src.node.0].attach_out_fft_edge(src.slot, id, class)?;
                let dst_buffer = self.nodes[dst.node.0]
                    .attach_in_fft_edge(dst.slot, id, class)
                    .map_err(|e| self.poison(e))?;
                EdgeCore::new(id, src, dst, domain).with_buffers(src_buffer, dst_buffer)
            }
        };
        self.edges.push(make(core));
        Ok(id)
    }

    fn poison(&mut self, err: NodeError) -> GraphError {
        let message = err.to_string();
        self.broken = Some(message.clone());
        GraphError::PartialAttach(message)
    }

    /// Identity edge between equal extents.
    pub fn connect_dummy(&mut self, src: impl Into<SlotRef>, dst: impl Into<SlotRef>) -> Result<EdgeId, GraphError> {
        let (src, dst) = (src.into(), dst.into());
        if self.get(src.node)?.core().fsize() != self.get(dst.node)?.core().fsize() {
            return Err(self.incompatible(src, dst, "dummy edges need equal extents"));
        }
        self.connect_with(src, dst, EdgeDomain::Real, |core| Box::new(DummyEdge::new(core)))
    }

    /// Spatial sparse convolution; the destination extent must be the valid
    /// extent of the source under `filter` and `sparse`.
    pub fn connect_filter(
        &mut self,
        src: impl Into<SlotRef>,
        dst: impl Into<SlotRef>,
        filter: Cube<f32>,
        sparse: Vec3i,
    ) -> Result<EdgeId, GraphError> {
        let (src, dst) = (src.into(), dst.into());
        self.check_valid(src, dst, filter.size(), sparse)?;
        self.connect_with(src, dst, EdgeDomain::Real, move |core| {
            Box::new(FilterEdge::new(core, filter, sparse))
        })
    }

    /// Dense convolution carried out as a product of spectra.
    pub fn connect_fft_filter(
        &mut self,
        src: impl Into<SlotRef>,
        dst: impl Into<SlotRef>,
        filter: Cube<f32>,
    ) -> Result<EdgeId, GraphError> {
        let (src, dst) = (src.into(), dst.into());
        self.check_valid(src, dst, filter.size(), Vec3i::splat(1))?;
        let class = self.get(src.node)?.core().fsize();
        self.connect_with(src, dst, EdgeDomain::Spectral, move |core| {
            Box::new(FftFilterEdge::new(core, filter, class))
        })
    }

    /// Sparse convolution performed by the destination node itself.
    pub fn connect_inplace(
        &mut self,
        src: impl Into<SlotRef>,
        dst: impl Into<SlotRef>,
        filter: Cube<f32>,
        sparse: Vec3i,
    ) -> Result<EdgeId, GraphError> {
        let (src, dst) = (src.into(), dst.into());
        self.check_valid(src, dst, filter.size(), sparse)?;
        self.connect_with(src, dst, EdgeDomain::Inplace, move |core| {
            Box::new(InplaceFilterEdge::new(core, filter, sparse))
        })
    }

    fn check_valid(&self, src: SlotRef, dst: SlotRef, filter: Vec3i, sparse: Vec3i) -> Result<(), GraphError> {
        let expected = valid_extent(self.get(src.node)?.core().fsize(), filter, sparse);
        if expected == Some(self.get(dst.node)?.core().fsize()) {
            Ok(())
        } else {
            Err(self.incompatible(src, dst, format!("filter {filter} with sparseness {sparse} does not fit")))
        }
    }

    /// Order the nodes (Kahn) and reset every enabled flag.
    pub fn build(self) -> Result<Arc<Network>, GraphError> {
        if let Some(message) = self.broken {
            return Err(GraphError::PartialAttach(message));
        }

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            let core = edge.core();
            successors[core.src().node.0].push(core.dst().node.0);
            in_degree[core.dst().node.0] += 1;
        }

        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_front() {
            order.push(NodeId(i));
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        if order.len() != self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i].name().to_string())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        let net = Network {
            nodes: self.nodes,
            edges: self.edges,
            names: self.names,
            order,
            scheduler: self.scheduler,
            phase: AtomicU8::new(Phase::Train.as_u8()),
        };
        propagation::reset(&net);
        Ok(Arc::new(net))
    }
}
