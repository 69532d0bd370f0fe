// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Network phases and the stochastic channel-group gate.
//!
//! Structural setup lives on [`crate::traits::Node::setup`]; the dropout
//! decision is this free function so a node kind cannot override it away.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{NodeError, OptionsError};
use crate::graph::{Network, NodeId};
use crate::init::BernoulliInit;
use crate::observability::messages::graph::DropoutDrawn;
use crate::observability::messages::StructuredLog;

/// Option key holding the keep-probability of a node.
pub const RATIO_KEY: &str = "ratio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Train,
    Test,
    Optimize,
}

impl Phase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Phase::Train => 0,
            Phase::Test => 1,
            Phase::Optimize => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Phase {
        match raw {
            1 => Phase::Test,
            2 => Phase::Optimize,
            _ => Phase::Train,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Train => "train",
            Phase::Test => "test",
            Phase::Optimize => "optimize",
        })
    }
}

/// Draw the dropout decision for one node.
///
/// Active only in [`Phase::Train`] and only when the node's options carry a
/// `ratio`. One Bernoulli trial with that keep-probability decides whether
/// the whole node is explicitly enabled or disabled; disablement cascades
/// through the graph. Returns `None` when the gate is inactive.
pub fn stochastic_gate<R: Rng + ?Sized>(
    net: &Network,
    id: NodeId,
    rng: &mut R,
) -> Result<Option<bool>, NodeError> {
    let core = net.node(id).core();
    if core.phase() != Phase::Train {
        return Ok(None);
    }
    let Some(ratio) = core.options().optional_as::<f64>(RATIO_KEY)? else {
        return Ok(None);
    };
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(OptionsError::OutOfRange {
            key: RATIO_KEY.to_string(),
            value: ratio,
            range: "(0, 1]",
        }
        .into());
    }

    let keep = BernoulliInit::new(ratio)?.draw(rng);
    DropoutDrawn {
        node: core.name(),
        ratio,
        keep,
    }
    .log();
    net.enable_node(id, keep);
    Ok(Some(keep))
}
