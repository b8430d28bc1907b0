//! Growable prefix-sum index keyed by epoch.
//!
//! A Fenwick tree over per-epoch values. Positions query the sum of a
//! contiguous epoch window (the epochs during which they were taking on
//! exposure), and settlements subtract from the epoch a policy entered in,
//! so both operations are `O(log n)` in the number of epochs and independent
//! of how many policies exist.
//!
//! The tree doubles its capacity when an epoch beyond the current range is
//! touched. The running total is bounds-checked on every add, which keeps
//! every internal node sum (a partial sum of non-negative values) in range.

use serde::{Deserialize, Serialize};
use umbra_types::EpochId;

use crate::{EpochError, Result};

const INITIAL_CAPACITY: usize = 64;

/// Prefix-sum index of non-negative per-epoch values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u128>", into = "Vec<u128>")]
pub struct EpochIndexedSum {
    values: Vec<u128>,
    tree: Vec<u128>,
    total: u128,
}

impl EpochIndexedSum {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from raw per-epoch values.
    ///
    /// # Errors
    ///
    /// - [`EpochError::Overflow`] if the values do not sum within `u128`
    pub fn from_values(values: Vec<u128>) -> Result<Self> {
        let total = values
            .iter()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
            .ok_or(EpochError::Overflow)?;
        let mut index = Self {
            values,
            tree: Vec::new(),
            total,
        };
        index.rebuild();
        Ok(index)
    }

    /// Raw per-epoch values, indexed by epoch.
    pub fn values(&self) -> &[u128] {
        &self.values
    }

    /// Sum over every epoch.
    pub fn total(&self) -> u128 {
        self.total
    }

    /// Value recorded at a single epoch.
    pub fn value_at(&self, epoch: EpochId) -> u128 {
        usize::try_from(epoch)
            .ok()
            .and_then(|i| self.values.get(i).copied())
            .unwrap_or(0)
    }

    /// Add `amount` at `epoch`.
    ///
    /// # Errors
    ///
    /// - [`EpochError::Overflow`] if the running total would overflow
    pub fn add(&mut self, epoch: EpochId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let slot = usize::try_from(epoch).map_err(|_| EpochError::Overflow)?;
        self.total = self.total.checked_add(amount).ok_or(EpochError::Overflow)?;
        self.ensure_capacity(slot);
        self.values[slot] += amount;
        let mut i = slot + 1;
        while i <= self.tree.len() {
            self.tree[i - 1] += amount;
            i += lowest_bit(i);
        }
        Ok(())
    }

    /// Subtract `amount` from `epoch`.
    ///
    /// # Errors
    ///
    /// - [`EpochError::Underflow`] if the epoch holds less than `amount`
    pub fn sub(&mut self, epoch: EpochId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let current = self.value_at(epoch);
        if current < amount {
            return Err(EpochError::Underflow("epoch index value"));
        }
        let slot = usize::try_from(epoch).map_err(|_| EpochError::Overflow)?;
        self.values[slot] -= amount;
        self.total -= amount;
        let mut i = slot + 1;
        while i <= self.tree.len() {
            self.tree[i - 1] -= amount;
            i += lowest_bit(i);
        }
        Ok(())
    }

    /// Sum of values at epochs `0..=epoch`.
    pub fn prefix_sum(&self, epoch: EpochId) -> u128 {
        let len = self.tree.len();
        let mut i = usize::try_from(epoch)
            .map(|e| e.saturating_add(1).min(len))
            .unwrap_or(len);
        let mut sum = 0u128;
        while i > 0 {
            sum += self.tree[i - 1];
            i -= lowest_bit(i);
        }
        sum
    }

    /// Sum of values at epochs `from..=to`. Empty when `from > to`.
    pub fn range_sum(&self, from: EpochId, to: EpochId) -> u128 {
        if from > to {
            return 0;
        }
        let upper = self.prefix_sum(to);
        let lower = match from.checked_sub(1) {
            Some(before) => self.prefix_sum(before),
            None => 0,
        };
        upper - lower
    }

    fn ensure_capacity(&mut self, slot: usize) {
        if slot < self.values.len() {
            return;
        }
        let doubled = self.values.len().saturating_mul(2).max(INITIAL_CAPACITY);
        let new_len = doubled.max(slot + 1);
        self.values.resize(new_len, 0);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let n = self.values.len();
        self.tree = self.values.clone();
        for i in 1..=n {
            let parent = i + lowest_bit(i);
            if parent <= n {
                self.tree[parent - 1] += self.tree[i - 1];
            }
        }
    }
}

fn lowest_bit(i: usize) -> usize {
    i & i.wrapping_neg()
}

impl TryFrom<Vec<u128>> for EpochIndexedSum {
    type Error = EpochError;

    fn try_from(values: Vec<u128>) -> Result<Self> {
        Self::from_values(values)
    }
}

impl From<EpochIndexedSum> for Vec<u128> {
    fn from(index: EpochIndexedSum) -> Self {
        index.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let index = EpochIndexedSum::new();
        assert_eq!(index.prefix_sum(10), 0);
        assert_eq!(index.range_sum(0, 100), 0);
        assert_eq!(index.total(), 0);
    }

    #[test]
    fn test_range_sums_match_naive() {
        let mut index = EpochIndexedSum::new();
        let mut naive = vec![0u128; 300];
        for (epoch, amount) in [(0u64, 5u128), (3, 7), (3, 1), (63, 2), (64, 11), (299, 13)] {
            index.add(epoch, amount).expect("add");
            naive[epoch as usize] += amount;
        }
        for from in [0u64, 1, 3, 4, 63, 64, 65, 200] {
            for to in [0u64, 3, 63, 64, 150, 299, 1_000] {
                let expected: u128 = if from > to {
                    0
                } else {
                    naive
                        .iter()
                        .enumerate()
                        .filter(|(e, _)| *e as u64 >= from && *e as u64 <= to)
                        .map(|(_, v)| *v)
                        .sum()
                };
                assert_eq!(index.range_sum(from, to), expected, "range {from}..={to}");
            }
        }
    }

    #[test]
    fn test_sub_restores_zero() {
        let mut index = EpochIndexedSum::new();
        index.add(5, 100).expect("add");
        index.add(9, 50).expect("add");
        index.sub(5, 100).expect("sub");
        assert_eq!(index.range_sum(0, 8), 0);
        assert_eq!(index.range_sum(0, 9), 50);
        assert_eq!(index.total(), 50);
    }

    #[test]
    fn test_sub_underflow_rejected() {
        let mut index = EpochIndexedSum::new();
        index.add(2, 10).expect("add");
        assert_eq!(
            index.sub(2, 11),
            Err(EpochError::Underflow("epoch index value"))
        );
        assert!(index.sub(7, 1).is_err());
        assert_eq!(index.value_at(2), 10);
    }

    #[test]
    fn test_total_overflow_rejected() {
        let mut index = EpochIndexedSum::new();
        index.add(0, u128::MAX).expect("add");
        assert_eq!(index.add(1, 1), Err(EpochError::Overflow));
        assert_eq!(index.value_at(1), 0);
    }

    #[test]
    fn test_growth_preserves_sums() {
        let mut index = EpochIndexedSum::new();
        index.add(1, 3).expect("add");
        index.add(10_000, 4).expect("add");
        assert_eq!(index.range_sum(0, 9_999), 3);
        assert_eq!(index.range_sum(0, 10_000), 7);
        assert!(index.values().len() > 10_000);
    }

    #[test]
    fn test_serde_rebuilds_tree() {
        let mut index = EpochIndexedSum::new();
        index.add(4, 40).expect("add");
        index.add(70, 7).expect("add");
        let json = serde_json::to_string(&index).expect("serialize");
        let back: EpochIndexedSum = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, index);
        assert_eq!(back.range_sum(5, 70), 7);
    }
}
