// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! State every node kind shares: layout, roles, priorities, phase, enabled
//! flags, edge links per slot, join points and outstanding work.
//!
//! Concrete kinds embed a [`NodeCore`] and expose it through
//! [`crate::traits::Node::core`]. The dispatch helpers here are the only
//! place a node submits work to the scheduler.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Options;
use crate::errors::{NodeError, TaskError};
use crate::graph::join::{Delivery, Fired, Join};
use crate::graph::pending::PendingWork;
use crate::graph::{Direction, EdgeId, Network, NodeId, Phase};
use crate::observability::messages::graph::JoinFired;
use crate::observability::messages::StructuredLog;
use crate::scheduler::TaskManager;
use crate::tensor::{fft, Complex32, Cube, Tensor, Vec3i};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Fed by the driver in the forward direction.
    Input,
    #[default]
    Hidden,
    /// Fed by the driver in the backward direction.
    Output,
}

/// Immutable shape and scheduling parameters of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub size: usize,
    pub batch_size: usize,
    pub fsize: Vec3i,
    pub role: NodeRole,
    pub fwd_priority: usize,
    pub bwd_priority: usize,
}

impl NodeLayout {
    pub fn new(size: usize, fsize: Vec3i) -> Self {
        Self {
            size,
            batch_size: 1,
            fsize,
            role: NodeRole::Hidden,
            fwd_priority: 0,
            bwd_priority: 0,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_priorities(mut self, fwd: usize, bwd: usize) -> Self {
        self.fwd_priority = fwd;
        self.bwd_priority = bwd;
        self
    }
}

#[derive(Debug, Default)]
struct SlotLinks {
    inputs: Vec<EdgeId>,
    outputs: Vec<EdgeId>,
    fft_inputs: Vec<(EdgeId, usize)>,
    fft_outputs: Vec<(EdgeId, usize)>,
}

#[derive(Debug)]
pub struct NodeCore {
    id: NodeId,
    name: String,
    layout: NodeLayout,
    options: Options,
    phase: AtomicU8,
    enabled: Vec<AtomicBool>,
    links: Vec<SlotLinks>,
    fft_in_classes: Vec<Vec3i>,
    fft_out_classes: Vec<Vec3i>,
    in_enabled: Vec<AtomicUsize>,
    out_enabled: Vec<AtomicUsize>,
    forward_join: Vec<Join>,
    backward_join: Vec<Join>,
    scheduler: Option<Arc<TaskManager>>,
    pending: PendingWork,
}

fn per_slot<T>(size: usize, f: impl Fn() -> T) -> Vec<T> {
    (0..size).map(|_| f()).collect()
}

impl NodeCore {
    /// Fails when `options` has no `name`.
    pub fn new(layout: NodeLayout, options: Options) -> Result<Self, NodeError> {
        let name = options.name()?;
        let size = layout.size;
        Ok(Self {
            id: NodeId(usize::MAX),
            name,
            layout,
            options,
            phase: AtomicU8::new(Phase::Train.as_u8()),
            enabled: per_slot(size, || AtomicBool::new(true)),
            links: per_slot(size, SlotLinks::default),
            fft_in_classes: Vec::new(),
            fft_out_classes: Vec::new(),
            in_enabled: per_slot(size, || AtomicUsize::new(0)),
            out_enabled: per_slot(size, || AtomicUsize::new(0)),
            forward_join: per_slot(size, Join::new),
            backward_join: per_slot(size, Join::new),
            scheduler: None,
            pending: PendingWork::default(),
        })
    }

    pub(crate) fn bind(&mut self, id: NodeId, scheduler: Arc<TaskManager>) {
        self.id = id;
        self.scheduler = Some(scheduler);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.size
    }

    pub fn batch_size(&self) -> usize {
        self.layout.batch_size
    }

    pub fn fsize(&self) -> Vec3i {
        self.layout.fsize
    }

    pub fn is_input(&self) -> bool {
        self.layout.role == NodeRole::Input
    }

    pub fn is_output(&self) -> bool {
        self.layout.role == NodeRole::Output
    }

    pub fn fwd_priority(&self) -> usize {
        self.layout.fwd_priority
    }

    pub fn bwd_priority(&self) -> usize {
        self.layout.bwd_priority
    }

    pub fn priority(&self, direction: Direction) -> usize {
        match direction {
            Direction::Forward => self.fwd_priority(),
            Direction::Backward => self.bwd_priority(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    // ---- enabled flags ----

    pub fn is_enabled(&self, slot: usize) -> bool {
        self.enabled
            .get(slot)
            .map(|f| f.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// True iff no channel group is enabled.
    pub fn is_disabled(&self) -> bool {
        !self.enabled.iter().any(|f| f.load(Ordering::Acquire))
    }

    pub fn enabled_flags(&self) -> Vec<bool> {
        self.enabled.iter().map(|f| f.load(Ordering::Acquire)).collect()
    }

    /// Returns the previous value.
    pub(crate) fn set_enabled(&self, slot: usize, on: bool) -> bool {
        self.enabled[slot].swap(on, Ordering::AcqRel)
    }

    pub fn check_slot(&self, slot: usize) -> Result<(), NodeError> {
        if slot < self.size() {
            Ok(())
        } else {
            Err(NodeError::SlotOutOfRange {
                node: self.name.clone(),
                slot,
                size: self.size(),
            })
        }
    }

    // ---- edge links ----

    pub fn attach_in(&mut self, slot: usize, edge: EdgeId) -> Result<(), NodeError> {
        self.check_slot(slot)?;
        self.links[slot].inputs.push(edge);
        self.size_joins(slot);
        Ok(())
    }

    pub fn attach_out(&mut self, slot: usize, edge: EdgeId) -> Result<(), NodeError> {
        self.check_slot(slot)?;
        self.links[slot].outputs.push(edge);
        self.size_joins(slot);
        Ok(())
    }

    /// Register a frequency-domain in-edge and return the buffer index of
    /// its size class.
    pub fn attach_in_fft(&mut self, slot: usize, edge: EdgeId, padded: Vec3i) -> Result<usize, NodeError> {
        self.check_padded(padded)?;
        self.check_slot(slot)?;
        let buffer = class_index(&mut self.fft_in_classes, padded);
        self.links[slot].fft_inputs.push((edge, buffer));
        self.size_joins(slot);
        Ok(buffer)
    }

    pub fn attach_out_fft(&mut self, slot: usize, edge: EdgeId, padded: Vec3i) -> Result<usize, NodeError> {
        self.check_padded(padded)?;
        self.check_slot(slot)?;
        let buffer = class_index(&mut self.fft_out_classes, padded);
        self.links[slot].fft_outputs.push((edge, buffer));
        self.size_joins(slot);
        Ok(buffer)
    }

    /// One join cell per incident edge on each side of `slot`.
    fn size_joins(&mut self, slot: usize) {
        let links = &self.links[slot];
        self.forward_join[slot] = Join::with_capacity(links.inputs.len() + links.fft_inputs.len());
        self.backward_join[slot] = Join::with_capacity(links.outputs.len() + links.fft_outputs.len());
    }

    fn check_padded(&self, padded: Vec3i) -> Result<(), NodeError> {
        if padded.covers(self.fsize()) {
            Ok(())
        } else {
            Err(NodeError::ShapeMismatch {
                node: self.name.clone(),
                expected: self.fsize(),
                actual: padded,
            })
        }
    }

    /// Every edge ending at `slot`, real and frequency-domain.
    pub fn in_edges(&self, slot: usize) -> Vec<EdgeId> {
        let links = &self.links[slot];
        links
            .inputs
            .iter()
            .copied()
            .chain(links.fft_inputs.iter().map(|&(e, _)| e))
            .collect()
    }

    /// Every edge leaving `slot`, real and frequency-domain.
    pub fn out_edges(&self, slot: usize) -> Vec<EdgeId> {
        let links = &self.links[slot];
        links
            .outputs
            .iter()
            .copied()
            .chain(links.fft_outputs.iter().map(|&(e, _)| e))
            .collect()
    }

    pub fn fft_in_classes(&self) -> &[Vec3i] {
        &self.fft_in_classes
    }

    pub fn fft_out_classes(&self) -> &[Vec3i] {
        &self.fft_out_classes
    }

    // ---- enabled edge counts ----

    pub fn in_enabled(&self, slot: usize) -> usize {
        self.in_enabled[slot].load(Ordering::Acquire)
    }

    pub fn out_enabled(&self, slot: usize) -> usize {
        self.out_enabled[slot].load(Ordering::Acquire)
    }

    pub(crate) fn adjust_in(&self, slot: usize, on: bool) -> usize {
        adjust(&self.in_enabled[slot], on)
    }

    pub(crate) fn adjust_out(&self, slot: usize, on: bool) -> usize {
        adjust(&self.out_enabled[slot], on)
    }

    pub(crate) fn set_counts(&self, slot: usize, inputs: usize, outputs: usize) {
        self.in_enabled[slot].store(inputs, Ordering::Release);
        self.out_enabled[slot].store(outputs, Ordering::Release);
    }

    /// Deliveries the forward join of `slot` waits for.
    pub fn expected_forward(&self, slot: usize) -> usize {
        if self.is_input() {
            1
        } else {
            self.in_enabled(slot)
        }
    }

    /// Deliveries the backward join of `slot` waits for.
    pub fn expected_backward(&self, slot: usize) -> usize {
        if self.is_output() {
            1
        } else {
            self.out_enabled(slot)
        }
    }

    // ---- joins ----

    /// Add one forward delivery; returns the summed input once all enabled
    /// in-edges have delivered.
    pub fn deliver_forward(&self, slot: usize, delivery: Delivery) -> Result<Option<Tensor<f32>>, NodeError> {
        self.check_slot(slot)?;
        let expected = self.expected_forward(slot);
        let fired = self.forward_join[slot].deliver(&self.name, slot, delivery, expected)?;
        Ok(fired.map(|f| self.merge(slot, f, Direction::Forward)))
    }

    /// Add one backward delivery; returns the summed gradient once all
    /// enabled out-edges have delivered.
    pub fn deliver_backward(&self, slot: usize, delivery: Delivery) -> Result<Option<Tensor<f32>>, NodeError> {
        self.check_slot(slot)?;
        let expected = self.expected_backward(slot);
        let fired = self.backward_join[slot].deliver(&self.name, slot, delivery, expected)?;
        Ok(fired.map(|f| self.merge(slot, f, Direction::Backward)))
    }

    /// Sum the real part of a fired join with every spectral class brought
    /// back to the node's extent.
    fn merge(&self, slot: usize, fired: Fired, direction: Direction) -> Tensor<f32> {
        JoinFired {
            node: &self.name,
            slot,
            direction,
            deliveries: fired.deliveries,
        }
        .log();

        let fsize = self.fsize();
        let mut total = fired
            .real
            .unwrap_or_else(|| vec![Cube::zeros(fsize); self.batch_size()]);
        for (buffer, spectra) in fired.spectral {
            let (classes, forward) = match direction {
                Direction::Forward => (&self.fft_in_classes, true),
                Direction::Backward => (&self.fft_out_classes, false),
            };
            let class = classes[buffer];
            // Forward results sit at the far corner of the circular product.
            let offset = if forward {
                class.checked_sub(fsize).unwrap_or_default()
            } else {
                Vec3i::default()
            };
            for (acc, spectrum) in total.iter_mut().zip(spectra.iter()) {
                acc.add_assign(&fft::inverse_cropped(spectrum, offset, fsize));
            }
        }
        total
    }

    /// Reject a batch whose length or cube extents do not match the node.
    pub fn check_batch<T: Copy + Default>(&self, tensor: &[Cube<T>], extent: Vec3i) -> Result<(), NodeError> {
        if tensor.len() != self.batch_size() {
            return Err(NodeError::BatchMismatch {
                node: self.name.clone(),
                expected: self.batch_size(),
                actual: tensor.len(),
            });
        }
        match tensor.iter().find(|c| c.size() != extent) {
            Some(cube) => Err(NodeError::ShapeMismatch {
                node: self.name.clone(),
                expected: extent,
                actual: cube.size(),
            }),
            None => Ok(()),
        }
    }

    // ---- dispatch ----

    /// Submit one unit of work and keep its handle for [`Self::wait_pending`].
    pub fn dispatch<F>(&self, priority: usize, work: F) -> Result<(), NodeError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let scheduler = self
            .scheduler
            .as_ref()
            .ok_or_else(|| NodeError::Detached(self.name.clone()))?;
        self.pending.push(scheduler.submit(priority, work));
        Ok(())
    }

    /// Send `output` of `slot` along every enabled out-edge at the forward
    /// priority. One spectrum is computed per size class and shared by the
    /// frequency-domain edges of that class.
    pub fn dispatch_forward(&self, net: &Arc<Network>, slot: usize, output: Tensor<f32>) -> Result<(), NodeError> {
        if !self.is_enabled(slot) {
            return Ok(());
        }
        let links = &self.links[slot];
        self.dispatch_all(
            net,
            Direction::Forward,
            output,
            &links.outputs,
            &links.fft_outputs,
            &self.fft_out_classes,
        )
    }

    /// Send the gradient of `slot` along every enabled in-edge at the
    /// backward priority.
    pub fn dispatch_backward(&self, net: &Arc<Network>, slot: usize, gradient: Tensor<f32>) -> Result<(), NodeError> {
        if !self.is_enabled(slot) {
            return Ok(());
        }
        let links = &self.links[slot];
        self.dispatch_all(
            net,
            Direction::Backward,
            gradient,
            &links.inputs,
            &links.fft_inputs,
            &self.fft_in_classes,
        )
    }

    fn dispatch_all(
        &self,
        net: &Arc<Network>,
        direction: Direction,
        mut tensor: Tensor<f32>,
        real: &[EdgeId],
        spectral: &[(EdgeId, usize)],
        classes: &[Vec3i],
    ) -> Result<(), NodeError> {
        let priority = self.priority(direction);
        let fsize = self.fsize();

        let spectral: Vec<(EdgeId, usize)> = spectral
            .iter()
            .copied()
            .filter(|&(e, _)| net.edge(e).core().is_enabled())
            .collect();
        let mut spectra: BTreeMap<usize, Arc<Tensor<Complex32>>> = BTreeMap::new();
        for &(edge, buffer) in &spectral {
            let spectrum = spectra
                .entry(buffer)
                .or_insert_with(|| {
                    let class = classes[buffer];
                    // Gradients go in at the far corner so the correlation
                    // lands at offset zero on the sending side.
                    let offset = match direction {
                        Direction::Forward => Vec3i::default(),
                        Direction::Backward => class.checked_sub(fsize).unwrap_or_default(),
                    };
                    Arc::new(
                        tensor
                            .iter()
                            .map(|cube| fft::forward_padded(cube, class, offset))
                            .collect(),
                    )
                })
                .clone();
            let net = Arc::clone(net);
            self.dispatch(priority, move || {
                let edge = net.edge(edge);
                match direction {
                    Direction::Forward => edge.forward_fft(&net, &spectrum)?,
                    Direction::Backward => edge.backward_fft(&net, &spectrum)?,
                }
                Ok(())
            })?;
        }

        let real: Vec<EdgeId> = real
            .iter()
            .copied()
            .filter(|&e| net.edge(e).core().is_enabled())
            .collect();
        let last = real.len().saturating_sub(1);
        for (i, edge) in real.into_iter().enumerate() {
            let payload = if i == last {
                std::mem::take(&mut tensor)
            } else {
                tensor.clone()
            };
            let net = Arc::clone(net);
            self.dispatch(priority, move || {
                let edge = net.edge(edge);
                match direction {
                    Direction::Forward => edge.forward(&net, payload)?,
                    Direction::Backward => edge.backward(&net, payload)?,
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Total submissions made on behalf of this node.
    pub fn dispatched(&self) -> u64 {
        self.pending.dispatched()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Wait for this node's outstanding work. Returns the first failure;
    /// any further failures go to the scheduler's error sink.
    pub fn wait_pending(&self) -> Result<usize, NodeError> {
        let (count, failures) = self.wait_failures();
        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(count),
            Some((_, first)) => {
                if let Some(scheduler) = &self.scheduler {
                    for (priority, rest) in failures {
                        scheduler.sink().report(priority, rest);
                    }
                }
                Err(first.into())
            }
        }
    }

    /// Wait for this node's outstanding work and hand back every failure
    /// with the priority its task ran at.
    pub(crate) fn wait_failures(&self) -> (usize, Vec<(usize, TaskError)>) {
        self.pending.wait_all()
    }

    /// Drop partial join sums.
    pub fn clear_joins(&self) {
        self.forward_join.iter().for_each(Join::clear);
        self.backward_join.iter().for_each(Join::clear);
    }
}

fn class_index(classes: &mut Vec<Vec3i>, padded: Vec3i) -> usize {
    match classes.iter().position(|&c| c == padded) {
        Some(i) => i,
        None => {
            classes.push(padded);
            classes.len() - 1
        }
    }
}

fn adjust(counter: &AtomicUsize, on: bool) -> usize {
    if on {
        counter.fetch_add(1, Ordering::AcqRel) + 1
    } else {
        let prev = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(size: usize) -> NodeCore {
        NodeCore::new(
            NodeLayout::new(size, Vec3i::splat(4)).with_priorities(3, 7),
            Options::named("n"),
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_name() {
        let err = NodeCore::new(NodeLayout::new(1, Vec3i::splat(1)), Options::new()).unwrap_err();
        assert!(matches!(err, NodeError::Options(_)));
    }

    #[test]
    fn test_disabled_iff_every_flag_is_false() {
        let core = core(3);
        assert!(!core.is_disabled());
        core.set_enabled(0, false);
        core.set_enabled(2, false);
        assert!(!core.is_disabled());
        assert_eq!(core.enabled_flags(), vec![false, true, false]);
        core.set_enabled(1, false);
        assert!(core.is_disabled());
        assert!(!core.is_enabled(99));
    }

    #[test]
    fn test_fft_edges_share_buffer_per_size_class() {
        let mut core = core(2);
        let a = core.attach_in_fft(0, EdgeId(0), Vec3i::splat(8)).unwrap();
        let b = core.attach_in_fft(1, EdgeId(1), Vec3i::splat(8)).unwrap();
        let c = core.attach_in_fft(0, EdgeId(2), Vec3i::splat(6)).unwrap();
        let d = core.attach_out_fft(0, EdgeId(3), Vec3i::splat(6)).unwrap();
        assert_eq!((a, b, c, d), (0, 0, 1, 0));
        assert_eq!(core.fft_in_classes(), &[Vec3i::splat(8), Vec3i::splat(6)]);
        assert_eq!(core.in_edges(0), vec![EdgeId(0), EdgeId(2)]);
    }

    #[test]
    fn test_fft_class_smaller_than_node_is_rejected() {
        let mut core = core(1);
        assert!(matches!(
            core.attach_out_fft(0, EdgeId(0), Vec3i::splat(2)),
            Err(NodeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut core = core(2);
        assert!(matches!(
            core.attach_out(2, EdgeId(0)),
            Err(NodeError::SlotOutOfRange { slot: 2, size: 2, .. })
        ));
    }

    #[test]
    fn test_expected_counts_follow_roles() {
        let input = NodeCore::new(
            NodeLayout::new(1, Vec3i::splat(2)).with_role(NodeRole::Input),
            Options::named("in"),
        )
        .unwrap();
        assert_eq!(input.expected_forward(0), 1);
        assert_eq!(input.expected_backward(0), 0);

        let hidden = core(1);
        hidden.set_counts(0, 3, 2);
        assert_eq!(hidden.expected_forward(0), 3);
        assert_eq!(hidden.expected_backward(0), 2);
        assert_eq!(hidden.adjust_in(0, false), 2);
        assert_eq!(hidden.adjust_out(0, true), 3);
    }

    #[test]
    fn test_joins_hold_one_cell_per_edge() {
        let mut core = core(1);
        assert_eq!(core.forward_join[0].capacity(), 1);
        core.attach_in(0, EdgeId(0)).unwrap();
        core.attach_in(0, EdgeId(1)).unwrap();
        core.attach_in_fft(0, EdgeId(2), Vec3i::splat(6)).unwrap();
        core.attach_out(0, EdgeId(3)).unwrap();
        assert_eq!(core.forward_join[0].capacity(), 3);
        assert_eq!(core.backward_join[0].capacity(), 1);
    }

    #[test]
    fn test_dispatch_without_network_is_detached() {
        let core = core(1);
        let err = core.dispatch(0, || Ok(())).unwrap_err();
        assert!(matches!(err, NodeError::Detached(_)));
        assert_eq!(core.priority(Direction::Forward), 3);
        assert_eq!(core.priority(Direction::Backward), 7);
    }

    #[test]
    fn test_check_batch() {
        let core = core(1);
        let ok = vec![Cube::<f32>::zeros(Vec3i::splat(4))];
        assert!(core.check_batch(&ok, Vec3i::splat(4)).is_ok());
        let wrong = vec![Cube::<f32>::zeros(Vec3i::splat(3))];
        assert!(matches!(
            core.check_batch(&wrong, Vec3i::splat(4)),
            Err(NodeError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            core.check_batch::<f32>(&[], Vec3i::splat(4)),
            Err(NodeError::BatchMismatch { .. })
        ));
    }
}
