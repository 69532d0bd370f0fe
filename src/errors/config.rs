// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors reading typed values out of a node's configuration bag.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("required option '{0}' is missing")]
    Missing(String),

    #[error("option '{key}' has an unexpected type: {source}")]
    InvalidType {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("option '{key}' has unsupported value '{value}'")]
    UnknownValue { key: String, value: String },

    #[error("option '{key}' = {value} is outside {range}")]
    OutOfRange {
        key: String,
        value: f64,
        range: &'static str,
    },
}

/// Errors loading or validating the engine configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
