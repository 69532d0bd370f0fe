// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // engine config + node option bags
pub mod edges;      // reference edge kinds
pub mod errors;     // error handling
pub mod graph;      // arena, joins, phases, propagation
pub mod init;       // random initializers
pub mod nodes;      // reference node kinds
pub mod observability;
pub mod optim;      // SGD used by the reference kinds
pub mod samples;    // synthetic sample generation
pub mod scheduler;  // priority task scheduler
pub mod tensor;     // cubes, kernels, fft
pub mod traits;     // capability interfaces
