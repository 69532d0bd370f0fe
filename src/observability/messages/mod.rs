// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! * `scheduler` - worker pool lifecycle and task failure routing
//! * `graph` - propagation, stochastic gating and pass lifecycle events

use tracing::Span;

pub mod graph;
pub mod scheduler;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emit the message as a tracing event at its documented level.
    fn log(&self);

    /// Open a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
