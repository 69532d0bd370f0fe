// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod graph;
mod node;
mod scheduler;

pub use config::{ConfigError, OptionsError};
pub use graph::GraphError;
pub use node::{Capability, NodeError};
pub use scheduler::TaskError;
