// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::OptionsError;

/// Name/value configuration bag attached to every node.
///
/// Keys the core reads are `name` (required) and `ratio` (optional dropout
/// keep-probability). Anything else is passed through untouched for the
/// concrete node kind.
///
/// # Example
/// ```
/// use cubegraph::config::Options;
///
/// let opts = Options::named("conv1").with("ratio", 0.5);
/// assert_eq!(opts.name().unwrap(), "conv1");
/// assert_eq!(opts.optional_as::<f64>("ratio").unwrap(), Some(0.5));
/// assert!(opts.optional_as::<f64>("missing").unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, serde_yaml::Value>);

impl Options {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with("name", name.into())
    }

    /// Builder-style insert. Values that fail to serialize are skipped.
    pub fn with<V: Serialize>(mut self, key: impl Into<String>, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        if let Ok(v) = serde_yaml::to_value(value) {
            self.0.insert(key.into(), v);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn require_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, OptionsError> {
        self.optional_as(key)?
            .ok_or_else(|| OptionsError::Missing(key.to_string()))
    }

    pub fn optional_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, OptionsError> {
        self.0
            .get(key)
            .map(|v| {
                serde_yaml::from_value(v.clone()).map_err(|source| OptionsError::InvalidType {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub fn name(&self) -> Result<String, OptionsError> {
        self.require_as("name")
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, serde_yaml::Value>> for Options {
    fn from(map: BTreeMap<String, serde_yaml::Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_from_yaml() {
        let yaml = r#"
name: hidden
ratio: 0.75
function: relu
size: 4
"#;
        let opts: Options = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.len(), 4);
        assert_eq!(opts.name().unwrap(), "hidden");
        assert_eq!(opts.require_as::<f64>("ratio").unwrap(), 0.75);
        assert_eq!(opts.require_as::<String>("function").unwrap(), "relu");
        assert_eq!(opts.require_as::<usize>("size").unwrap(), 4);
    }

    #[test]
    fn test_missing_and_mistyped_keys() {
        let opts = Options::named("n").with("ratio", "half");
        assert!(matches!(opts.require_as::<f64>("absent"), Err(OptionsError::Missing(_))));
        assert!(matches!(
            opts.require_as::<f64>("ratio"),
            Err(OptionsError::InvalidType { .. })
        ));
        assert!(Options::new().name().is_err());
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let opts = Options::named("out").with("bias", vec![0.5f32, -0.5]);
        let text = serde_yaml::to_string(&opts).unwrap();
        let back: Options = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, opts);
    }
}
