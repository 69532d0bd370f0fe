// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod integration_tests;
mod loader;
mod options;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, EngineConfig, SchedulerConfig, TrainingConfig,
};
pub use options::Options;
