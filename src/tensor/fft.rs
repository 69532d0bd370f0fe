// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Separable 3D FFT over cubes.
//!
//! Implementation uses rustfft for the 1D transforms along each axis. The
//! inverse is normalized by the cube volume so `ifft(fft(c)) == c`.

use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::tensor::{Cube, Vec3i};

/// Forward transform of a real cube, zero-padded to `padded` with the data
/// placed at `offset`.
pub fn forward_padded(cube: &Cube<f32>, padded: Vec3i, offset: Vec3i) -> Cube<Complex32> {
    let mut spectrum = cube
        .pad(padded, offset)
        .map(|v| Complex32::new(v, 0.0));
    transform(&mut spectrum, FftDirection::Forward);
    spectrum
}

/// Inverse transform keeping the real part of the region `offset..offset + size`.
pub fn inverse_cropped(spectrum: &Cube<Complex32>, offset: Vec3i, size: Vec3i) -> Cube<f32> {
    let mut work = spectrum.clone();
    transform(&mut work, FftDirection::Inverse);
    let scale = 1.0 / spectrum.size().volume() as f32;
    work.crop(offset, size).map(|c| c.re * scale)
}

/// Element-wise `a * conj(b)`.
pub fn multiply_conj(a: &Cube<Complex32>, b: &Cube<Complex32>) -> Cube<Complex32> {
    debug_assert_eq!(a.size(), b.size());
    let data = a
        .data()
        .iter()
        .zip(b.data().iter())
        .map(|(&x, &y)| x * y.conj())
        .collect();
    Cube::from_vec(a.size(), data).unwrap_or_else(|| Cube::zeros(a.size()))
}

fn transform(cube: &mut Cube<Complex32>, direction: FftDirection) {
    let size = cube.size();
    let mut planner = FftPlanner::<f32>::new();
    let dims = size.as_array();
    for (axis, &len) in dims.iter().enumerate() {
        if len > 1 {
            let fft = planner.plan_fft(len, direction);
            transform_axis(cube, axis, &fft);
        }
    }
}

fn transform_axis(cube: &mut Cube<Complex32>, axis: usize, fft: &Arc<dyn Fft<f32>>) {
    let size = cube.size();
    let strides = [size.y * size.z, size.z, 1];
    let dims = size.as_array();
    let len = dims[axis];
    let stride = strides[axis];

    // The two axes not being transformed enumerate the lines.
    let (a, b) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };

    let mut line = vec![Complex32::default(); len];
    let data = cube.data_mut();
    for i in 0..dims[a] {
        for j in 0..dims[b] {
            let base = i * strides[a] + j * strides[b];
            for (k, slot) in line.iter_mut().enumerate() {
                *slot = data[base + k * stride];
            }
            fft.process(&mut line);
            for (k, value) in line.iter().enumerate() {
                data[base + k * stride] = *value;
            }
        }
    }
}
