// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Spatial-domain sparse convolution kernels.
//!
//! `sparse` spaces the filter taps apart (a sparseness of 1 is a dense
//! filter). All three kernels use true convolution so they agree with the
//! frequency-domain path:
//!
//! `out[x] = sum_j f[x + (k - 1 - j) * s] * w[j]`

use crate::tensor::{Cube, Vec3i};

/// Extent of the filter footprint: `(k - 1) * s + 1` per axis, or `None`
/// for an empty filter or a zero sparseness.
pub fn sparse_extent(filter: Vec3i, sparse: Vec3i) -> Option<Vec3i> {
    Some(Vec3i::new(
        footprint_axis(filter.x, sparse.x)?,
        footprint_axis(filter.y, sparse.y)?,
        footprint_axis(filter.z, sparse.z)?,
    ))
}

fn footprint_axis(taps: usize, sparse: usize) -> Option<usize> {
    if sparse == 0 {
        return None;
    }
    taps.checked_sub(1)?.checked_mul(sparse)?.checked_add(1)
}

/// Output extent of a valid convolution, or `None` if the filter does not fit.
pub fn valid_extent(input: Vec3i, filter: Vec3i, sparse: Vec3i) -> Option<Vec3i> {
    let footprint = sparse_extent(filter, sparse)?;
    input
        .checked_sub(footprint)
        .map(|d| d + Vec3i::splat(1))
}

fn for_each_tap(filter: Vec3i, mut f: impl FnMut(usize, usize, usize)) {
    for a in 0..filter.x {
        for b in 0..filter.y {
            for c in 0..filter.z {
                f(a, b, c);
            }
        }
    }
}

/// Valid sparse convolution of `input` with `filter`.
pub fn convolve_sparse_valid(input: &Cube<f32>, filter: &Cube<f32>, sparse: Vec3i) -> Cube<f32> {
    let k = filter.size();
    let out_size = valid_extent(input.size(), k, sparse).unwrap_or_default();
    let mut out = Cube::<f32>::zeros(out_size);

    for_each_tap(k, |a, b, c| {
        let w = filter.get(a, b, c);
        let dx = (k.x - 1 - a) * sparse.x;
        let dy = (k.y - 1 - b) * sparse.y;
        let dz = (k.z - 1 - c) * sparse.z;
        for x in 0..out_size.x {
            for y in 0..out_size.y {
                for z in 0..out_size.z {
                    let v = out.get(x, y, z) + input.get(x + dx, y + dy, z + dz) * w;
                    out.set(x, y, z, v);
                }
            }
        }
    });
    out
}

/// Gradient of [`convolve_sparse_valid`] with respect to its input:
/// scatters `gradient` back through the filter into a cube of `input_size`.
pub fn convolve_sparse_backward(
    gradient: &Cube<f32>,
    filter: &Cube<f32>,
    sparse: Vec3i,
    input_size: Vec3i,
) -> Cube<f32> {
    let k = filter.size();
    let g = gradient.size();
    let mut out = Cube::<f32>::zeros(input_size);

    for_each_tap(k, |a, b, c| {
        let w = filter.get(a, b, c);
        let dx = (k.x - 1 - a) * sparse.x;
        let dy = (k.y - 1 - b) * sparse.y;
        let dz = (k.z - 1 - c) * sparse.z;
        for x in 0..g.x {
            for y in 0..g.y {
                for z in 0..g.z {
                    let v = out.get(x + dx, y + dy, z + dz) + gradient.get(x, y, z) * w;
                    out.set(x + dx, y + dy, z + dz, v);
                }
            }
        }
    });
    out
}

/// Gradient of [`convolve_sparse_valid`] with respect to the filter.
pub fn filter_gradient(
    input: &Cube<f32>,
    gradient: &Cube<f32>,
    filter_size: Vec3i,
    sparse: Vec3i,
) -> Cube<f32> {
    let k = filter_size;
    let g = gradient.size();
    let mut out = Cube::<f32>::zeros(k);

    for_each_tap(k, |a, b, c| {
        let dx = (k.x - 1 - a) * sparse.x;
        let dy = (k.y - 1 - b) * sparse.y;
        let dz = (k.z - 1 - c) * sparse.z;
        let mut acc = 0.0f32;
        for x in 0..g.x {
            for y in 0..g.y {
                for z in 0..g.z {
                    acc += gradient.get(x, y, z) * input.get(x + dx, y + dy, z + dz);
                }
            }
        }
        out.set(a, b, c, acc);
    });
    out
}
