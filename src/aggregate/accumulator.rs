use ndarray::Array1;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::error::Incompatibility;

/// Shared sink that workers merge their per-file results into.
pub trait Accumulator<T>: Sync {
    fn merge(&self, index: usize, value: T) -> Result<(), Incompatibility>;
}

/// One write-once slot per input file, in input order.
///
/// Slots are disjoint, so writes need no lock.
#[derive(Debug)]
pub struct IndexedSlots<T> {
    slots: Vec<OnceLock<T>>,
}

impl<T> IndexedSlots<T> {
    pub fn new(len: usize) -> Self {
        IndexedSlots {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    /// All results in input order, or the first index that was never filled.
    pub fn into_vec(self) -> Result<Vec<T>, usize> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.into_inner().ok_or(i))
            .collect()
    }
}

impl<T: Send + Sync> Accumulator<T> for IndexedSlots<T> {
    fn merge(&self, index: usize, value: T) -> Result<(), Incompatibility> {
        let slot = self.slots.get(index).ok_or(Incompatibility::Size {
            what: "input",
            expected: self.slots.len(),
            found: index + 1,
        })?;
        let fresh = slot.set(value).is_ok();
        debug_assert!(fresh, "slot {index} written twice");
        Ok(())
    }
}

/// Element-wise running sum of fixed-length vectors.
///
/// The first contribution fixes the length.
#[derive(Debug, Default)]
pub struct RunningSum {
    total: Mutex<Option<Array1<f64>>>,
}

impl RunningSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Option<Array1<f64>> {
        self.total
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Accumulator<Array1<f64>> for RunningSum {
    fn merge(&self, _index: usize, value: Array1<f64>) -> Result<(), Incompatibility> {
        let mut guard = self.total.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            None => *guard = Some(value),
            Some(total) => {
                if total.len() != value.len() {
                    return Err(Incompatibility::Size {
                        what: "mass vector entry",
                        expected: total.len(),
                        found: value.len(),
                    });
                }
                *total += &value;
            }
        }
        Ok(())
    }
}
