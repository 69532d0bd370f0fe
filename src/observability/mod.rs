// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with a `Display` implementation
//! so log text lives in one place instead of being scattered through the
//! scheduler and the graph code.
//!
//! Messages are organized by subsystem:
//! * `messages::scheduler` - worker pool lifecycle and task failures
//! * `messages::graph` - enable/disable propagation, dropout draws, pass lifecycle
//!
//! # Usage
//!
//! ```rust
//! use cubegraph::observability::messages::StructuredLog;
//! use cubegraph::observability::messages::scheduler::WorkerPoolStarted;
//!
//! let msg = WorkerPoolStarted { workers: 4, thread_name: "cubegraph-worker" };
//! msg.log();
//! ```

pub mod messages;
