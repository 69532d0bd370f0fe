// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Count-then-fire join points.
//!
//! A delivery claims a ticket from an atomic counter and parks its tensor in
//! the cell that ticket names, so concurrent deliveries never wait on each
//! other. A second counter records parked cells; the delivery that brings it
//! to the expected count sums every cell and fires. Real and spectral
//! deliveries share both counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::errors::NodeError;
use crate::scheduler::lock;
use crate::tensor::{accumulate, Complex32, Tensor};

/// One partial result arriving at a join.
#[derive(Debug)]
pub enum Delivery {
    Real(Tensor<f32>),
    /// Frequency-domain data for the size class `buffer`.
    Spectral {
        buffer: usize,
        data: Tensor<Complex32>,
    },
}

/// Everything accumulated for one sample, handed to the firing delivery.
#[derive(Debug, Default)]
pub struct Fired {
    pub real: Option<Tensor<f32>>,
    pub spectral: BTreeMap<usize, Tensor<Complex32>>,
    pub deliveries: usize,
}

impl Fired {
    fn add(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Real(data) => match self.real.as_mut() {
                Some(acc) => accumulate(acc, &data),
                None => self.real = Some(data),
            },
            Delivery::Spectral { buffer, data } => match self.spectral.get_mut(&buffer) {
                Some(acc) => accumulate(acc, &data),
                None => {
                    self.spectral.insert(buffer, data);
                }
            },
        }
        self.deliveries += 1;
    }
}

#[derive(Debug)]
pub struct Join {
    claimed: AtomicUsize,
    parked: AtomicUsize,
    // Each cell is only ever touched by the ticket holder and, after every
    // ticket has parked, by the firing delivery.
    cells: Vec<Mutex<Option<Delivery>>>,
}

impl Default for Join {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl Join {
    pub fn new() -> Self {
        Self::default()
    }

    /// A join that can hold up to `capacity` deliveries per sample.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            claimed: AtomicUsize::new(0),
            parked: AtomicUsize::new(0),
            cells: (0..capacity.max(1)).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Add one delivery. Returns the accumulated sums when this delivery is
    /// the last of `expected`.
    pub fn deliver(
        &self,
        node: &str,
        slot: usize,
        delivery: Delivery,
        expected: usize,
    ) -> Result<Option<Fired>, NodeError> {
        let ticket = self.claimed.fetch_add(1, Ordering::AcqRel);
        if ticket >= expected || ticket >= self.cells.len() {
            return Err(NodeError::JoinInconsistency {
                node: node.to_string(),
                slot,
                arrived: ticket + 1,
                expected,
            });
        }
        *lock(&self.cells[ticket]) = Some(delivery);

        let parked = self.parked.fetch_add(1, Ordering::AcqRel) + 1;
        if parked < expected {
            return Ok(None);
        }

        let mut fired = Fired::default();
        for cell in &self.cells[..expected] {
            if let Some(delivery) = lock(cell).take() {
                fired.add(delivery);
            }
        }
        self.parked.store(0, Ordering::Release);
        self.claimed.store(0, Ordering::Release);
        Ok(Some(fired))
    }

    /// Deliveries received for the sample in flight.
    pub fn arrived(&self) -> usize {
        self.claimed.load(Ordering::Acquire)
    }

    /// Drop any partial sums.
    pub fn clear(&self) {
        for cell in &self.cells {
            *lock(cell) = None;
        }
        self.parked.store(0, Ordering::Release);
        self.claimed.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Cube, Vec3i};
    use std::sync::Arc;

    fn ones(value: f32) -> Tensor<f32> {
        vec![Cube::filled(Vec3i::splat(2), value)]
    }

    #[test]
    fn test_fires_on_last_delivery_only() {
        let join = Join::with_capacity(3);
        assert!(join.deliver("j", 0, Delivery::Real(ones(1.0)), 3).unwrap().is_none());
        assert!(join.deliver("j", 0, Delivery::Real(ones(2.0)), 3).unwrap().is_none());
        let fired = join
            .deliver("j", 0, Delivery::Real(ones(4.0)), 3)
            .unwrap()
            .expect("third delivery fires");
        assert_eq!(fired.deliveries, 3);
        assert!(fired.real.unwrap()[0].data().iter().all(|&v| v == 7.0));
        assert_eq!(join.arrived(), 0);
    }

    #[test]
    fn test_spectral_and_real_share_the_counter() {
        let join = Join::with_capacity(3);
        let spectrum = vec![Cube::filled(Vec3i::splat(2), Complex32::new(1.0, -1.0))];
        assert!(join
            .deliver("j", 1, Delivery::Spectral { buffer: 0, data: spectrum.clone() }, 3)
            .unwrap()
            .is_none());
        assert!(join
            .deliver("j", 1, Delivery::Spectral { buffer: 0, data: spectrum }, 3)
            .unwrap()
            .is_none());
        let fired = join.deliver("j", 1, Delivery::Real(ones(1.0)), 3).unwrap().unwrap();
        assert_eq!(fired.spectral.len(), 1);
        assert_eq!(fired.spectral[&0][0].data()[0], Complex32::new(2.0, -2.0));
        assert!(fired.real.is_some());
    }

    #[test]
    fn test_extra_delivery_is_inconsistent() {
        let join = Join::new();
        let err = join.deliver("late", 2, Delivery::Real(ones(1.0)), 0).unwrap_err();
        assert!(matches!(
            err,
            NodeError::JoinInconsistency { slot: 2, arrived: 1, expected: 0, .. }
        ));
    }

    #[test]
    fn test_delivery_beyond_capacity_is_inconsistent() {
        let join = Join::with_capacity(2);
        assert_eq!(join.capacity(), 2);
        assert!(join.deliver("j", 0, Delivery::Real(ones(1.0)), 3).unwrap().is_none());
        assert!(join.deliver("j", 0, Delivery::Real(ones(1.0)), 3).unwrap().is_none());
        assert!(matches!(
            join.deliver("j", 0, Delivery::Real(ones(1.0)), 3),
            Err(NodeError::JoinInconsistency { arrived: 3, .. })
        ));
        join.clear();
        assert_eq!(join.arrived(), 0);
        let fired = join.deliver("j", 0, Delivery::Real(ones(5.0)), 1).unwrap().unwrap();
        assert!(fired.real.unwrap()[0].data().iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_concurrent_deliveries_fire_exactly_once() {
        for _ in 0..50 {
            let join = Arc::new(Join::with_capacity(8));
            let threads: Vec<_> = (0..8)
                .map(|i| {
                    let join = Arc::clone(&join);
                    std::thread::spawn(move || {
                        join.deliver("j", 0, Delivery::Real(ones(i as f32)), 8)
                            .unwrap()
                    })
                })
                .collect();
            let fired: Vec<Fired> = threads
                .into_iter()
                .filter_map(|t| t.join().unwrap())
                .collect();
            assert_eq!(fired.len(), 1);
            let total: f32 = (0..8).map(|i| i as f32).sum();
            assert!(fired[0].real.as_ref().unwrap()[0]
                .data()
                .iter()
                .all(|&v| v == total));
        }
    }
}
