// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Synthetic samples for tests and benchmarks.
//!
//! ```
//! use cubegraph::samples::{generate_inout, BlobLayout};
//! use cubegraph::tensor::Vec3i;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let layout = BlobLayout::default()
//!     .with_input("image", Vec3i::splat(4), 2)
//!     .with_output("label", Vec3i::splat(2), 1);
//! let (inputs, outputs) = generate_inout(3, &layout, &mut StdRng::seed_from_u64(1));
//! assert_eq!(inputs.len(), 3);
//! assert_eq!(inputs[0]["image"].len(), 2);
//! assert_eq!(outputs[2]["label"][0].size(), Vec3i::splat(2));
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::init::{Initializer, UniformInit};
use crate::tensor::{Cube, Vec3i};

/// Named cube lists for one sample.
pub type Blobs = BTreeMap<String, Vec<Cube<f32>>>;

/// One [`Blobs`] per sample.
pub type InOut = Vec<Blobs>;

/// Anything that can name its input and output blobs with their cube
/// extent and cube count.
pub trait InOutLayout {
    fn inputs(&self) -> BTreeMap<String, (Vec3i, usize)>;
    fn outputs(&self) -> BTreeMap<String, (Vec3i, usize)>;
}

/// A free-standing layout, useful when no network is at hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLayout {
    #[serde(default)]
    pub inputs: BTreeMap<String, (Vec3i, usize)>,
    #[serde(default)]
    pub outputs: BTreeMap<String, (Vec3i, usize)>,
}

impl BlobLayout {
    pub fn with_input(mut self, name: impl Into<String>, extent: Vec3i, count: usize) -> Self {
        self.inputs.insert(name.into(), (extent, count));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, extent: Vec3i, count: usize) -> Self {
        self.outputs.insert(name.into(), (extent, count));
        self
    }
}

impl InOutLayout for BlobLayout {
    fn inputs(&self) -> BTreeMap<String, (Vec3i, usize)> {
        self.inputs.clone()
    }

    fn outputs(&self) -> BTreeMap<String, (Vec3i, usize)> {
        self.outputs.clone()
    }
}

/// Generate `n` input samples and `n` output samples shaped after
/// `layout`, every value uniform in `[-1, 1]`.
pub fn generate_inout<L, R>(n: usize, layout: &L, rng: &mut R) -> (InOut, InOut)
where
    L: InOutLayout + ?Sized,
    R: Rng + ?Sized,
{
    let init = UniformInit::symmetric(1.0);
    let ins = layout.inputs();
    let outs = layout.outputs();

    let mut inputs = Vec::with_capacity(n);
    let mut outputs = Vec::with_capacity(n);
    for _ in 0..n {
        inputs.push(fill(&ins, &init, rng));
        outputs.push(fill(&outs, &init, rng));
    }
    (inputs, outputs)
}

fn fill<R: Rng + ?Sized>(layout: &BTreeMap<String, (Vec3i, usize)>, init: &UniformInit, rng: &mut R) -> Blobs {
    layout.iter()
        .map(|(name, &(extent, count))| {
            let cubes = (0..count)
                .map(|_| {
                    let mut cube = Cube::zeros(extent);
                    init.initialize_cube(rng, &mut cube);
                    cube
                })
                .collect();
            (name.clone(), cubes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shapes_follow_layout() {
        let layout = BlobLayout::default()
            .with_input("a", Vec3i::new(2, 3, 4), 3)
            .with_input("b", Vec3i::splat(1), 1)
            .with_output("out", Vec3i::splat(2), 2);
        let (ins, outs) = generate_inout(4, &layout, &mut StdRng::seed_from_u64(9));

        assert_eq!(ins.len(), 4);
        assert_eq!(outs.len(), 4);
        for sample in &ins {
            assert_eq!(sample.keys().collect::<Vec<_>>(), vec!["a", "b"]);
            assert_eq!(sample["a"].len(), 3);
            assert!(sample["a"].iter().all(|c| c.size() == Vec3i::new(2, 3, 4)));
        }
        assert!(outs.iter().all(|s| s["out"].len() == 2));
    }

    #[test]
    fn test_values_in_unit_range() {
        let layout = BlobLayout::default().with_input("x", Vec3i::splat(5), 2);
        let (ins, outs) = generate_inout(2, &layout, &mut StdRng::seed_from_u64(1));
        let values: Vec<f32> = ins
            .iter()
            .flat_map(|s| s["x"].iter().flat_map(|c| c.data().to_vec()))
            .collect();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(outs.iter().all(BTreeMap::is_empty));
    }

    #[test]
    fn test_cubes_are_fresh_and_seeded() {
        let layout = BlobLayout::default().with_input("x", Vec3i::splat(3), 2);
        let (a, _) = generate_inout(2, &layout, &mut StdRng::seed_from_u64(5));
        let (b, _) = generate_inout(2, &layout, &mut StdRng::seed_from_u64(5));
        assert_eq!(a[0]["x"][0].data(), b[0]["x"][0].data());
        assert_ne!(a[0]["x"][0].data(), a[0]["x"][1].data());
        assert_ne!(a[0]["x"][0].data(), a[1]["x"][0].data());
    }

    #[test]
    fn test_zero_samples() {
        let layout = BlobLayout::default().with_input("x", Vec3i::splat(1), 1);
        let (ins, outs) = generate_inout(0, &layout, &mut StdRng::seed_from_u64(0));
        assert!(ins.is_empty() && outs.is_empty());
    }
}
