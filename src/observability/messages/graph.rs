// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph passes and enable/disable propagation.
//!
//! Propagation and join events fire on the hot path and log at `debug!` /
//! `trace!`; pass lifecycle events log at `info!`.

use crate::graph::{Direction, Phase};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A channel group was switched off by propagation.
///
/// # Log Level
/// `debug!` - Diagnostic detail
///
/// # Example
/// ```
/// use cubegraph::graph::Direction;
/// use cubegraph::observability::messages::graph::SlotDisabled;
///
/// let msg = SlotDisabled { node: "conv2", slot: 3, cascade: Some(Direction::Forward) };
/// assert_eq!(msg.to_string(), "Disabled 'conv2'[3] (forward cascade)");
///
/// let msg = SlotDisabled { node: "conv2", slot: 0, cascade: None };
/// assert_eq!(msg.to_string(), "Disabled 'conv2'[0] (explicit)");
/// ```
pub struct SlotDisabled<'a> {
    pub node: &'a str,
    pub slot: usize,
    /// `None` when the caller disabled the slot directly.
    pub cascade: Option<Direction>,
}

impl Display for SlotDisabled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.cascade {
            Some(direction) => write!(
                f,
                "Disabled '{}'[{}] ({} cascade)",
                self.node, self.slot, direction
            ),
            None => write!(f, "Disabled '{}'[{}] (explicit)", self.node, self.slot),
        }
    }
}

impl StructuredLog for SlotDisabled<'_> {
    fn log(&self) {
        tracing::debug!(
            node = self.node,
            slot = self.slot,
            cascade = ?self.cascade,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "slot_disabled",
            span_name = name,
            node = self.node,
            slot = self.slot,
            cascade = ?self.cascade,
        )
    }
}

/// Outcome of one stochastic gate draw.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct DropoutDrawn<'a> {
    pub node: &'a str,
    pub ratio: f64,
    pub keep: bool,
}

impl Display for DropoutDrawn<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropout draw for '{}' (keep ratio {}): {}",
            self.node,
            self.ratio,
            if self.keep { "kept" } else { "dropped" }
        )
    }
}

impl StructuredLog for DropoutDrawn<'_> {
    fn log(&self) {
        tracing::debug!(
            node = self.node,
            ratio = self.ratio,
            keep = self.keep,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "dropout",
            span_name = name,
            node = self.node,
            ratio = self.ratio,
            keep = self.keep,
        )
    }
}

/// Network-wide phase change.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PhaseChanged {
    pub phase: Phase,
    pub node_count: usize,
}

impl Display for PhaseChanged {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Switched {} nodes to {} phase", self.node_count, self.phase)
    }
}

impl StructuredLog for PhaseChanged {
    fn log(&self) {
        tracing::info!(phase = %self.phase, node_count = self.node_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "phase_changed",
            span_name = name,
            phase = %self.phase,
            node_count = self.node_count,
        )
    }
}

/// A driver started feeding one sample.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct PassStarted {
    pub direction: Direction,
    pub blobs: usize,
}

impl Display for PassStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Starting {} pass over {} blobs", self.direction, self.blobs)
    }
}

impl StructuredLog for PassStarted {
    fn log(&self) {
        tracing::debug!(direction = %self.direction, blobs = self.blobs, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pass",
            span_name = name,
            direction = %self.direction,
            blobs = self.blobs,
        )
    }
}

/// A pass was completed and waited on.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PassCompleted {
    pub direction: Direction,
    pub disabled_nodes: usize,
    pub duration: std::time::Duration,
}

impl Display for PassCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} pass completed in {:?} ({} nodes disabled)",
            self.direction, self.duration, self.disabled_nodes
        )
    }
}

impl StructuredLog for PassCompleted {
    fn log(&self) {
        tracing::info!(
            direction = %self.direction,
            disabled_nodes = self.disabled_nodes,
            duration_us = self.duration.as_micros() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pass",
            span_name = name,
            direction = %self.direction,
            disabled_nodes = self.disabled_nodes,
            duration = ?self.duration,
        )
    }
}

/// A join point received its last delivery and fired.
///
/// # Log Level
/// `trace!` - Hot path detail
pub struct JoinFired<'a> {
    pub node: &'a str,
    pub slot: usize,
    pub direction: Direction,
    pub deliveries: usize,
}

impl Display for JoinFired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "'{}'[{}] {} join fired after {} deliveries",
            self.node, self.slot, self.direction, self.deliveries
        )
    }
}

impl StructuredLog for JoinFired<'_> {
    fn log(&self) {
        tracing::trace!(
            node = self.node,
            slot = self.slot,
            direction = %self.direction,
            deliveries = self.deliveries,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "join",
            span_name = name,
            node = self.node,
            slot = self.slot,
            direction = %self.direction,
        )
    }
}
