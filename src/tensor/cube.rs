// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::ops::{Add, Mul};

use serde::{Deserialize, Serialize};

/// A 3D extent or offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Vec3i {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Vec3i {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Same extent along every axis.
    pub const fn splat(n: usize) -> Self {
        Self::new(n, n, n)
    }

    pub const fn volume(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.x, self.y, self.z]
    }

    /// Component-wise `self >= other`.
    pub fn covers(&self, other: Vec3i) -> bool {
        self.x >= other.x && self.y >= other.y && self.z >= other.z
    }

    pub fn checked_sub(&self, other: Vec3i) -> Option<Vec3i> {
        Some(Vec3i::new(
            self.x.checked_sub(other.x)?,
            self.y.checked_sub(other.y)?,
            self.z.checked_sub(other.z)?,
        ))
    }
}

impl Add for Vec3i {
    type Output = Vec3i;

    fn add(self, rhs: Vec3i) -> Vec3i {
        Vec3i::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Mul for Vec3i {
    type Output = Vec3i;

    fn mul(self, rhs: Vec3i) -> Vec3i {
        Vec3i::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

impl fmt::Display for Vec3i {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Dense 3D array, x-major with z contiguous.
#[derive(Clone, PartialEq)]
pub struct Cube<T> {
    size: Vec3i,
    data: Vec<T>,
}

impl<T> fmt::Debug for Cube<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cube").field("size", &self.size).finish()
    }
}

impl<T: Copy + Default> Cube<T> {
    pub fn zeros(size: Vec3i) -> Self {
        Self {
            size,
            data: vec![T::default(); size.volume()],
        }
    }

    pub fn filled(size: Vec3i, value: T) -> Self {
        Self {
            size,
            data: vec![value; size.volume()],
        }
    }

    /// Returns `None` when `data.len()` does not match the extent.
    pub fn from_vec(size: Vec3i, data: Vec<T>) -> Option<Self> {
        (data.len() == size.volume()).then_some(Self { size, data })
    }

    pub fn size(&self) -> Vec3i {
        self.size
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.size.y + y) * self.size.z + z
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> T {
        self.data[self.index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: T) {
        let i = self.index(x, y, z);
        self.data[i] = value;
    }

    pub fn map<U: Copy + Default>(&self, f: impl Fn(T) -> U) -> Cube<U> {
        Cube {
            size: self.size,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Copies `self` into a zeroed cube of extent `size`, starting at `offset`.
    pub fn pad(&self, size: Vec3i, offset: Vec3i) -> Cube<T> {
        debug_assert!(size.covers(offset + self.size));
        let mut out = Cube::zeros(size);
        for x in 0..self.size.x {
            for y in 0..self.size.y {
                let src = self.index(x, y, 0);
                let dst = out.index(x + offset.x, y + offset.y, offset.z);
                out.data[dst..dst + self.size.z].copy_from_slice(&self.data[src..src + self.size.z]);
            }
        }
        out
    }

    /// Extracts the sub-cube of extent `size` starting at `offset`.
    pub fn crop(&self, offset: Vec3i, size: Vec3i) -> Cube<T> {
        debug_assert!(self.size.covers(offset + size));
        let mut out = Cube::zeros(size);
        for x in 0..size.x {
            for y in 0..size.y {
                let src = self.index(x + offset.x, y + offset.y, offset.z);
                let dst = out.index(x, y, 0);
                out.data[dst..dst + size.z].copy_from_slice(&self.data[src..src + size.z]);
            }
        }
        out
    }
}

impl<T: Copy + Default + Add<Output = T>> Cube<T> {
    /// Element-wise `self += other`. Extents must match.
    pub fn add_assign(&mut self, other: &Cube<T>) {
        debug_assert_eq!(self.size, other.size);
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = *a + b;
        }
    }

    pub fn sum(&self) -> T {
        self.data.iter().fold(T::default(), |acc, &v| acc + v)
    }
}

impl<T: Copy + Default + Mul<Output = T>> Cube<T> {
    /// Element-wise product. Extents must match.
    pub fn hadamard(&self, other: &Cube<T>) -> Cube<T> {
        debug_assert_eq!(self.size, other.size);
        Cube {
            size: self.size,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| a * b)
                .collect(),
        }
    }
}

/// Element-wise `acc += other` over two batches.
pub fn accumulate<T: Copy + Default + Add<Output = T>>(acc: &mut [Cube<T>], other: &[Cube<T>]) {
    for (a, b) in acc.iter_mut().zip(other.iter()) {
        a.add_assign(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_then_crop_restores_original() {
        let size = Vec3i::new(2, 3, 2);
        let cube = Cube::from_vec(size, (0..12).map(|v| v as f32).collect()).unwrap();

        let padded = cube.pad(Vec3i::new(4, 5, 4), Vec3i::new(1, 2, 1));
        assert_eq!(padded.size(), Vec3i::new(4, 5, 4));
        assert_eq!(padded.get(1, 2, 1), 0.0);
        assert_eq!(padded.get(2, 4, 2), cube.get(1, 2, 1));
        assert_eq!(padded.sum(), cube.sum());

        let back = padded.crop(Vec3i::new(1, 2, 1), size);
        assert_eq!(back, cube);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Cube::<f32>::from_vec(Vec3i::splat(2), vec![0.0; 7]).is_none());
    }

    #[test]
    fn test_accumulate_adds_each_sample() {
        let mut acc = vec![Cube::filled(Vec3i::splat(2), 1.0f32); 2];
        let other = vec![Cube::filled(Vec3i::splat(2), 2.0f32); 2];
        accumulate(&mut acc, &other);
        assert!(acc.iter().all(|c| c.data().iter().all(|&v| v == 3.0)));
    }
}
