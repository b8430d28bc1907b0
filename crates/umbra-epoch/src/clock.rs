//! Epoch clock.
//!
//! Maps timestamps to epoch indexes by floor division over a fixed epoch
//! length measured from a genesis timestamp. The mapping is pure and
//! monotone: `timestamp_of(epoch_index_of(t))` is the boundary at or before
//! `t`.

use serde::{Deserialize, Serialize};
use umbra_types::{EpochId, EPOCH_LENGTH_SECS};

use crate::{EpochError, Result};

/// Fixed-length epoch clock anchored at a genesis timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    genesis: u64,
    length: u64,
}

impl EpochClock {
    /// Create a clock with a custom epoch length.
    ///
    /// # Errors
    ///
    /// - [`EpochError::InvalidEpochLength`] if `length` is zero
    pub fn new(genesis: u64, length: u64) -> Result<Self> {
        if length == 0 {
            return Err(EpochError::InvalidEpochLength);
        }
        Ok(Self { genesis, length })
    }

    /// Create a clock with daily epochs.
    pub fn daily(genesis: u64) -> Self {
        Self {
            genesis,
            length: EPOCH_LENGTH_SECS,
        }
    }

    /// Genesis timestamp (start of epoch 0).
    pub fn genesis(&self) -> u64 {
        self.genesis
    }

    /// Epoch length in seconds.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Epoch index containing `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`EpochError::TimestampBeforeGenesis`] if `timestamp < genesis`
    pub fn epoch_index_of(&self, timestamp: u64) -> Result<EpochId> {
        let elapsed = timestamp
            .checked_sub(self.genesis)
            .ok_or(EpochError::TimestampBeforeGenesis {
                timestamp,
                genesis: self.genesis,
            })?;
        Ok(elapsed / self.length)
    }

    /// Boundary timestamp at which `epoch` starts.
    ///
    /// # Errors
    ///
    /// - [`EpochError::Overflow`] if the boundary does not fit in a `u64`
    pub fn timestamp_of(&self, epoch: EpochId) -> Result<u64> {
        epoch
            .checked_mul(self.length)
            .and_then(|offset| offset.checked_add(self.genesis))
            .ok_or(EpochError::Overflow)
    }

    /// Seconds from `timestamp` until the next epoch boundary.
    pub fn seconds_until_next(&self, timestamp: u64) -> Result<u64> {
        let epoch = self.epoch_index_of(timestamp)?;
        let next = self.timestamp_of(epoch + 1)?;
        Ok(next - timestamp)
    }
}
