// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod capability;
pub mod edge;
pub mod node;

pub use capability::{ComplexPass, FeaturemapAccess, InplacePass, RealPass, Trainable};
pub use edge::{Edge, EdgeCore, EdgeDomain};
pub use node::Node;
