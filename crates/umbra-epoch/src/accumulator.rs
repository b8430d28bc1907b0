//! Global reward/shadow accumulator.
//!
//! The accumulator is a "reward per token" staking accumulator extended with
//! a second series for exposure:
//!
//! ```text
//! accRPS[e+1] = accRPS[e] + premiums_e / earning_liquidity_e
//! accSPS[e+1] = accSPS[e] + Σ SPS of policies minted during e
//! ```
//!
//! Epoch records are append-only. [`GlobalAccumulator::check_and_advance`]
//! is the single place that appends them, and it processes every crossed
//! boundary in increasing order, so a call that arrives days late produces
//! the same records as one call per day would have.
//!
//! Liquidity deposited during epoch `e` joins the earning set at the
//! boundary into `e+1`; it is counted in `total` immediately but only in
//! `earning` from the next epoch on.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use umbra_types::math::{apply_per_share, bps_of, per_share};
use umbra_types::{Amount, EpochId};

use crate::clock::EpochClock;
use crate::{EpochError, Result};

/// Accumulator values frozen at an epoch boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Sequential epoch index.
    pub epoch_id: EpochId,
    /// Boundary timestamp at which the epoch starts.
    pub timestamp: u64,
    /// Cumulative reward per unit of principal, `PRECISION`-scaled.
    pub acc_rps: u128,
    /// Cumulative shadow per unit of principal, `PRECISION`-scaled.
    pub acc_sps: u128,
    /// Total pool liquidity at the boundary.
    pub total_liquidity: Amount,
    /// Liquidity earning premiums during this epoch.
    pub earning_liquidity: Amount,
}

/// Running liquidity totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityTotals {
    /// Principal of every position that has not exited.
    pub total: Amount,
    /// Principal of positions earning in the current epoch.
    pub earning: Amount,
    /// Principal deposited this epoch, earning from the next one.
    pub pending_entry: Amount,
}

/// Outcome of an epoch check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Epoch current before the call.
    pub from_epoch: EpochId,
    /// Epoch current after the call.
    pub to_epoch: EpochId,
    /// Premium credited to liquidity providers through accRPS.
    pub distributed: Amount,
    /// Premium routed to the risk reserve (configured cut, empty-pool
    /// premiums and rounding dust).
    pub reserve_credit: Amount,
}

impl AdvanceReport {
    /// Whether no boundary was crossed.
    pub fn is_noop(&self) -> bool {
        self.from_epoch == self.to_epoch
    }

    /// Epochs appended by this call.
    pub fn new_epochs(&self) -> impl Iterator<Item = EpochId> {
        (self.from_epoch + 1)..=self.to_epoch
    }
}

/// Most boundaries a single epoch check will close. Each one appends an
/// [`EpochRecord`], so a timestamp far in the future is refused rather than
/// catching up record by record.
pub const MAX_CATCH_UP_EPOCHS: u64 = 100_000;

/// Global accumulator state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAccumulator {
    clock: EpochClock,
    epochs: Vec<EpochRecord>,
    liquidity: LiquidityTotals,
    pending_premium: Amount,
    pending_sps: u128,
}

impl GlobalAccumulator {
    /// Create an accumulator holding only the genesis epoch.
    pub fn new(clock: EpochClock) -> Self {
        let genesis = EpochRecord {
            epoch_id: 0,
            timestamp: clock.genesis(),
            acc_rps: 0,
            acc_sps: 0,
            total_liquidity: 0,
            earning_liquidity: 0,
        };
        Self {
            clock,
            epochs: vec![genesis],
            liquidity: LiquidityTotals::default(),
            pending_premium: 0,
            pending_sps: 0,
        }
    }

    /// Reassemble an accumulator from persisted parts.
    ///
    /// # Errors
    ///
    /// - [`EpochError::EpochNotFinalized`] if `epochs` is empty or its ids
    ///   are not the sequence `0..n`
    pub fn restore(
        clock: EpochClock,
        epochs: Vec<EpochRecord>,
        liquidity: LiquidityTotals,
        pending_premium: Amount,
        pending_sps: u128,
    ) -> Result<Self> {
        if epochs.is_empty() {
            return Err(EpochError::EpochNotFinalized {
                requested: 0,
                current: 0,
            });
        }
        for (i, record) in epochs.iter().enumerate() {
            if record.epoch_id != i as u64 {
                return Err(EpochError::EpochNotFinalized {
                    requested: i as u64,
                    current: record.epoch_id,
                });
            }
        }
        Ok(Self {
            clock,
            epochs,
            liquidity,
            pending_premium,
            pending_sps,
        })
    }

    /// The clock driving this accumulator.
    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    /// Current (latest finalized) epoch index.
    pub fn current_epoch(&self) -> EpochId {
        (self.epochs.len() - 1) as EpochId
    }

    /// All finalized epoch records, indexed by epoch id.
    pub fn epochs(&self) -> &[EpochRecord] {
        &self.epochs
    }

    /// Latest finalized epoch record.
    pub fn latest(&self) -> &EpochRecord {
        &self.epochs[self.epochs.len() - 1]
    }

    /// Record for a finalized epoch.
    ///
    /// # Errors
    ///
    /// - [`EpochError::EpochNotFinalized`] if `epoch` is in the future
    pub fn record(&self, epoch: EpochId) -> Result<&EpochRecord> {
        usize::try_from(epoch)
            .ok()
            .and_then(|i| self.epochs.get(i))
            .ok_or(EpochError::EpochNotFinalized {
                requested: epoch,
                current: self.current_epoch(),
            })
    }

    /// accRPS at a finalized epoch.
    pub fn acc_rps_at(&self, epoch: EpochId) -> Result<u128> {
        Ok(self.record(epoch)?.acc_rps)
    }

    /// accSPS at a finalized epoch.
    pub fn acc_sps_at(&self, epoch: EpochId) -> Result<u128> {
        Ok(self.record(epoch)?.acc_sps)
    }

    /// Running liquidity totals.
    pub fn liquidity(&self) -> &LiquidityTotals {
        &self.liquidity
    }

    /// Premium collected in the current epoch, not yet distributed.
    pub fn pending_premium(&self) -> Amount {
        self.pending_premium
    }

    /// SPS minted in the current epoch, not yet folded into accSPS.
    pub fn pending_sps(&self) -> u128 {
        self.pending_sps
    }

    /// Finalize every epoch boundary crossed up to `now`.
    ///
    /// Idempotent within an epoch. `reserve_bps` is the share of each
    /// epoch's premium routed to the risk reserve instead of providers.
    ///
    /// # Errors
    ///
    /// - [`EpochError::TimestampBeforeGenesis`] if `now` precedes genesis
    /// - [`EpochError::NonMonotonicTime`] if `now` falls in an earlier epoch
    /// - [`EpochError::TooFarAhead`] if `now` lies more than
    ///   [`MAX_CATCH_UP_EPOCHS`] boundaries ahead
    /// - [`EpochError::Overflow`] on accumulator overflow
    pub fn check_and_advance(&mut self, now: u64, reserve_bps: u32) -> Result<AdvanceReport> {
        let target = self.clock.epoch_index_of(now)?;
        let from = self.current_epoch();
        let mut report = AdvanceReport {
            from_epoch: from,
            to_epoch: from,
            ..AdvanceReport::default()
        };
        if target < from {
            return Err(EpochError::NonMonotonicTime {
                requested: target,
                current: from,
            });
        }
        if target - from > MAX_CATCH_UP_EPOCHS {
            return Err(EpochError::TooFarAhead {
                requested: target,
                current: from,
            });
        }

        while self.current_epoch() < target {
            self.close_epoch(reserve_bps, &mut report)?;
        }
        report.to_epoch = target;
        Ok(report)
    }

    fn close_epoch(&mut self, reserve_bps: u32, report: &mut AdvanceReport) -> Result<()> {
        let closing = self.latest().clone();
        let premium = std::mem::take(&mut self.pending_premium);
        let sps = std::mem::take(&mut self.pending_sps);
        let earning = self.liquidity.earning;

        let reserve_cut = bps_of(premium, reserve_bps).ok_or(EpochError::Overflow)?;
        let to_providers = premium - reserve_cut;

        let (delta_rps, credited) = if to_providers == 0 {
            (0, 0)
        } else if earning == 0 {
            warn!(
                epoch = closing.epoch_id,
                premium = to_providers,
                "no earning liquidity; premium routed to reserve"
            );
            (0, 0)
        } else {
            let delta = per_share(to_providers, earning).ok_or(EpochError::Overflow)?;
            let credited = apply_per_share(earning, delta).ok_or(EpochError::Overflow)?;
            (delta, credited)
        };

        report.distributed += credited;
        report.reserve_credit += premium - credited;

        self.liquidity.earning = earning
            .checked_add(self.liquidity.pending_entry)
            .ok_or(EpochError::Overflow)?;
        self.liquidity.pending_entry = 0;

        let next = EpochRecord {
            epoch_id: closing.epoch_id + 1,
            timestamp: self.clock.timestamp_of(closing.epoch_id + 1)?,
            acc_rps: closing
                .acc_rps
                .checked_add(delta_rps)
                .ok_or(EpochError::Overflow)?,
            acc_sps: closing.acc_sps.checked_add(sps).ok_or(EpochError::Overflow)?,
            total_liquidity: self.liquidity.total,
            earning_liquidity: self.liquidity.earning,
        };

        debug!(
            epoch = next.epoch_id,
            acc_rps = next.acc_rps,
            acc_sps = next.acc_sps,
            delta_rps,
            delta_sps = sps,
            total_liquidity = next.total_liquidity,
            "epoch finalized"
        );

        self.epochs.push(next);
        Ok(())
    }

    /// Register a deposit that starts earning next epoch.
    pub fn add_entry(&mut self, amount: Amount) -> Result<()> {
        self.liquidity.total = self
            .liquidity
            .total
            .checked_add(amount)
            .ok_or(EpochError::Overflow)?;
        self.liquidity.pending_entry = self
            .liquidity
            .pending_entry
            .checked_add(amount)
            .ok_or(EpochError::Overflow)?;
        Ok(())
    }

    /// Withdraw a deposit made this epoch before it starts earning.
    pub fn cancel_entry(&mut self, amount: Amount) -> Result<()> {
        self.liquidity.pending_entry = self
            .liquidity
            .pending_entry
            .checked_sub(amount)
            .ok_or(EpochError::Underflow("pending entry"))?;
        self.liquidity.total = self
            .liquidity
            .total
            .checked_sub(amount)
            .ok_or(EpochError::Underflow("total liquidity"))?;
        Ok(())
    }

    /// Remove earning liquidity (a position exiting).
    pub fn remove_earning(&mut self, amount: Amount) -> Result<()> {
        self.liquidity.earning = self
            .liquidity
            .earning
            .checked_sub(amount)
            .ok_or(EpochError::Underflow("earning liquidity"))?;
        self.liquidity.total = self
            .liquidity
            .total
            .checked_sub(amount)
            .ok_or(EpochError::Underflow("total liquidity"))?;
        Ok(())
    }

    /// Accrue premium collected this epoch.
    pub fn accrue_premium(&mut self, amount: Amount) -> Result<()> {
        self.pending_premium = self
            .pending_premium
            .checked_add(amount)
            .ok_or(EpochError::Overflow)?;
        Ok(())
    }

    /// Take back premium collected this epoch (cancellation refund).
    pub fn revoke_premium(&mut self, amount: Amount) -> Result<()> {
        self.pending_premium = self
            .pending_premium
            .checked_sub(amount)
            .ok_or(EpochError::Underflow("pending premium"))?;
        Ok(())
    }

    /// Record SPS minted this epoch.
    pub fn add_sps(&mut self, sps: u128) -> Result<()> {
        self.pending_sps = self.pending_sps.checked_add(sps).ok_or(EpochError::Overflow)?;
        Ok(())
    }

    /// Remove SPS minted this epoch (cancellation before entry).
    pub fn revoke_sps(&mut self, sps: u128) -> Result<()> {
        self.pending_sps = self
            .pending_sps
            .checked_sub(sps)
            .ok_or(EpochError::Underflow("pending sps"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use umbra_types::{units, PRECISION};

    use super::*;

    const GENESIS: u64 = 1_700_000_000;
    const DAY: u64 = 86_400;

    fn accumulator() -> GlobalAccumulator {
        GlobalAccumulator::new(EpochClock::daily(GENESIS))
    }

    #[test]
    fn test_genesis_state() {
        let acc = accumulator();
        assert_eq!(acc.current_epoch(), 0);
        assert_eq!(acc.latest().timestamp, GENESIS);
        assert_eq!(acc.acc_rps_at(0).expect("rps"), 0);
    }

    #[test]
    fn test_same_epoch_is_noop() {
        let mut acc = accumulator();
        acc.add_entry(units(100)).expect("entry");
        let first = acc.check_and_advance(GENESIS + DAY + 5, 0).expect("advance");
        assert_eq!(first.to_epoch, 1);
        let snapshot = acc.clone();
        for offset in [6, 100, DAY - 1] {
            let report = acc.check_and_advance(GENESIS + DAY + offset, 0).expect("advance");
            assert!(report.is_noop());
        }
        assert_eq!(acc, snapshot);
    }

    #[test]
    fn test_entry_earns_from_next_epoch() {
        let mut acc = accumulator();
        acc.add_entry(units(1_000)).expect("entry");
        assert_eq!(acc.liquidity().earning, 0);
        assert_eq!(acc.liquidity().total, units(1_000));

        acc.check_and_advance(GENESIS + DAY, 0).expect("advance");
        assert_eq!(acc.liquidity().earning, units(1_000));
        assert_eq!(acc.liquidity().pending_entry, 0);
        assert_eq!(acc.latest().earning_liquidity, units(1_000));
    }

    #[test]
    fn test_premium_distribution() {
        let mut acc = accumulator();
        acc.add_entry(units(10_000)).expect("entry");
        acc.check_and_advance(GENESIS + DAY, 0).expect("advance");

        acc.accrue_premium(units(2)).expect("premium");
        let report = acc.check_and_advance(GENESIS + 2 * DAY, 0).expect("advance");

        assert_eq!(report.distributed, units(2));
        assert_eq!(report.reserve_credit, 0);
        // 2 units over 10_000 units of principal
        assert_eq!(acc.acc_rps_at(2).expect("rps"), PRECISION / 5_000);
        assert_eq!(acc.pending_premium(), 0);
    }

    #[test]
    fn test_reserve_cut() {
        let mut acc = accumulator();
        acc.add_entry(units(1_000)).expect("entry");
        acc.check_and_advance(GENESIS + DAY, 0).expect("advance");
        acc.accrue_premium(units(10)).expect("premium");
        let report = acc.check_and_advance(GENESIS + 2 * DAY, 1_000).expect("advance");
        assert_eq!(report.reserve_credit, units(1));
        assert_eq!(report.distributed, units(9));
    }

    #[test]
    fn test_empty_pool_carries_forward() {
        let mut acc = accumulator();
        acc.accrue_premium(units(5)).expect("premium");
        let report = acc.check_and_advance(GENESIS + DAY, 0).expect("advance");
        assert_eq!(acc.acc_rps_at(1).expect("rps"), 0);
        assert_eq!(report.distributed, 0);
        assert_eq!(report.reserve_credit, units(5));
    }

    #[test]
    fn test_catch_up_multiple_boundaries() {
        let mut acc = accumulator();
        acc.add_entry(units(500)).expect("entry");
        acc.accrue_premium(units(1)).expect("premium");
        acc.add_sps(PRECISION / 10).expect("sps");

        let report = acc.check_and_advance(GENESIS + 5 * DAY + 1, 0).expect("advance");
        assert_eq!(report.new_epochs().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(acc.current_epoch(), 5);
        for (i, record) in acc.epochs().iter().enumerate() {
            assert_eq!(record.epoch_id, i as u64);
            assert_eq!(record.timestamp, GENESIS + i as u64 * DAY);
        }
        // The pending SPS lands in epoch 1 and is carried unchanged.
        assert_eq!(acc.acc_sps_at(1).expect("sps"), PRECISION / 10);
        assert_eq!(acc.acc_sps_at(5).expect("sps"), PRECISION / 10);
        assert_eq!(acc.pending_sps(), 0);
    }

    #[test]
    fn test_accumulators_monotone() {
        let mut acc = accumulator();
        acc.add_entry(units(100)).expect("entry");
        for day in 1..20u64 {
            acc.accrue_premium(units(u128::from(day % 3))).expect("premium");
            acc.add_sps(u128::from(day) * 1_000).expect("sps");
            acc.check_and_advance(GENESIS + day * DAY, 0).expect("advance");
        }
        for pair in acc.epochs().windows(2) {
            assert!(pair[1].acc_rps >= pair[0].acc_rps);
            assert!(pair[1].acc_sps >= pair[0].acc_sps);
        }
    }

    #[test]
    fn test_time_going_backwards_rejected() {
        let mut acc = accumulator();
        acc.check_and_advance(GENESIS + 3 * DAY, 0).expect("advance");
        assert_eq!(
            acc.check_and_advance(GENESIS + DAY, 0),
            Err(EpochError::NonMonotonicTime {
                requested: 1,
                current: 3
            })
        );
    }

    #[test]
    fn test_far_future_timestamp_rejected() {
        let mut acc = accumulator();
        acc.add_entry(units(100)).expect("entry");
        let snapshot = acc.clone();
        assert_eq!(
            acc.check_and_advance(u64::MAX, 0),
            Err(EpochError::TooFarAhead {
                requested: (u64::MAX - GENESIS) / DAY,
                current: 0
            })
        );
        assert_eq!(acc, snapshot);

        let limit = GENESIS + MAX_CATCH_UP_EPOCHS * DAY;
        assert!(acc.check_and_advance(limit + DAY, 0).is_err());
        let report = acc.check_and_advance(limit, 0).expect("advance");
        assert_eq!(report.to_epoch, MAX_CATCH_UP_EPOCHS);
    }

    #[test]
    fn test_future_epoch_not_finalized() {
        let acc = accumulator();
        assert!(matches!(
            acc.acc_rps_at(1),
            Err(EpochError::EpochNotFinalized { requested: 1, .. })
        ));
    }

    #[test]
    fn test_liquidity_underflow() {
        let mut acc = accumulator();
        acc.add_entry(10).expect("entry");
        assert!(acc.remove_earning(10).is_err());
        acc.cancel_entry(10).expect("cancel");
        assert_eq!(acc.liquidity().total, 0);
    }

    #[test]
    fn test_restore_requires_sequential_epochs() {
        let acc = accumulator();
        let mut epochs = acc.epochs().to_vec();
        epochs[0].epoch_id = 3;
        assert!(GlobalAccumulator::restore(
            *acc.clock(),
            epochs,
            LiquidityTotals::default(),
            0,
            0
        )
        .is_err());
        assert!(GlobalAccumulator::restore(
            *acc.clock(),
            Vec::new(),
            LiquidityTotals::default(),
            0,
            0
        )
        .is_err());
    }
}
