// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_ETA, DEFAULT_MOMENTUM, DEFAULT_SAMPLES, DEFAULT_THREAD_NAME, DEFAULT_WEIGHT_DECAY,
    FALLBACK_WORKERS,
};
use crate::errors::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Engine configuration for a driver process.
///
/// Every section is optional; missing values fall back to the constants in
/// [`crate::config::consts`].
///
/// # Example
/// ```yaml
/// scheduler:
///   workers: 8
///   thread_name: znn-worker
/// seed: 1
/// training:
///   eta: 0.01
///   momentum: 0.9
///   weight_decay: 0.0005
/// samples: 16
/// ```
#[derive(Debug, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub samples: Option<usize>,
}

/// Worker pool options.
#[derive(Debug, Deserialize, Default)]
pub struct SchedulerConfig {
    pub workers: Option<usize>,
    pub thread_name: Option<String>,
}

impl SchedulerConfig {
    /// Configured worker count, or the number of available cores.
    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_WORKERS)
        })
    }

    pub fn get_thread_name(&self) -> &str {
        self.thread_name.as_deref().unwrap_or(DEFAULT_THREAD_NAME)
    }
}

/// Hyperparameters pushed into every trainable node and edge.
#[derive(Debug, Deserialize, Default)]
pub struct TrainingConfig {
    pub eta: Option<f32>,
    pub momentum: Option<f32>,
    pub weight_decay: Option<f32>,
}

impl TrainingConfig {
    pub fn get_eta(&self) -> f32 {
        self.eta.unwrap_or(DEFAULT_ETA)
    }

    pub fn get_momentum(&self) -> f32 {
        self.momentum.unwrap_or(DEFAULT_MOMENTUM)
    }

    pub fn get_weight_decay(&self) -> f32 {
        self.weight_decay.unwrap_or(DEFAULT_WEIGHT_DECAY)
    }
}

impl EngineConfig {
    pub fn get_samples(&self) -> usize {
        self.samples.unwrap_or(DEFAULT_SAMPLES)
    }

    /// Rejects values that cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.workers == Some(0) {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()));
        }
        let t = &self.training;
        for (key, value) in [
            ("training.eta", t.get_eta()),
            ("training.momentum", t.get_momentum()),
            ("training.weight_decay", t.get_weight_decay()),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    key, value
                )));
            }
        }
        if t.get_momentum() >= 1.0 {
            return Err(ConfigError::Invalid("training.momentum must be below 1".into()));
        }
        Ok(())
    }
}

/// Load an engine config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let cfg: EngineConfig = serde_yaml::from_str(&content)?;
    Ok(cfg)
}

/// Load and validate an engine config from a YAML file
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let cfg = load_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}
