//! The transactional pool engine.
//!
//! [`InsurancePool`] owns the pool state and its collaborators. Every
//! mutating entry point runs through one private `transact` step:
//!
//! 1. clone the state, custody and reserve
//! 2. finalize crossed epoch boundaries on the clone
//! 3. run the operation, which queues effects and events
//! 4. execute the effects against the cloned custody and reserve
//! 5. swap the clones in and notify observers
//!
//! An error at any step drops the clones, so a failed call leaves no trace.

use serde::{Deserialize, Serialize};
use tracing::debug;
use umbra_pricing::PricingOracle;
use umbra_types::{Address, Amount, EpochId, PolicyId, PositionId};

use crate::collaborators::{AssetCustody, Authority, PoolObserver, RiskReserve};
use crate::config::PoolConfig;
use crate::policy::{CoverQuote, CoverTerms};
use crate::state::{PoolSnapshot, PoolState, PositionExposure};
use crate::tx::{Effect, Tx};
use crate::Result;

/// Pool-level totals at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub current_epoch: EpochId,
    pub total_liquidity: Amount,
    pub earning_liquidity: Amount,
    pub pending_entry: Amount,
    pub total_liquidity_last_epoch: Amount,
    pub k_last: Amount,
    pub locked_coverage: Amount,
    pub standard_risk: Amount,
    pub acc_rps: u128,
    pub acc_sps: u128,
    pub pending_premium: Amount,
    pub reserve_available: Amount,
    pub positions: usize,
    pub policies: usize,
}

/// Insurance pool with its collaborators.
///
/// Custody and reserve are cloned per call so their side effects roll back
/// with the state when a later step fails.
pub struct InsurancePool<C, R> {
    state: PoolState,
    custody: C,
    reserve: R,
    authority: Box<dyn Authority>,
    pricing: Box<dyn PricingOracle>,
    observers: Vec<Box<dyn PoolObserver>>,
}

impl<C, R> InsurancePool<C, R>
where
    C: AssetCustody + Clone,
    R: RiskReserve + Clone,
{
    /// Create an uninitialized pool.
    pub fn new(
        config: PoolConfig,
        custody: C,
        reserve: R,
        authority: Box<dyn Authority>,
        pricing: Box<dyn PricingOracle>,
    ) -> Result<Self> {
        Ok(Self::from_state(
            PoolState::new(config)?,
            custody,
            reserve,
            authority,
            pricing,
        ))
    }

    /// Resume a pool from existing state.
    pub fn from_state(
        state: PoolState,
        custody: C,
        reserve: R,
        authority: Box<dyn Authority>,
        pricing: Box<dyn PricingOracle>,
    ) -> Self {
        Self {
            state,
            custody,
            reserve,
            authority,
            pricing,
            observers: Vec::new(),
        }
    }

    /// Register an observer for committed events.
    pub fn add_observer(&mut self, observer: Box<dyn PoolObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn reserve(&self) -> &R {
        &self.reserve
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.state.snapshot()
    }

    fn transact<T>(&mut self, now: u64, op: impl FnOnce(&mut Tx<'_>) -> Result<T>) -> Result<T> {
        let mut staged = self.state.clone();
        let mut custody = self.custody.clone();
        let mut reserve = self.reserve.clone();

        let outcome = {
            let mut tx = Tx::new(
                &mut staged,
                self.authority.as_ref(),
                self.pricing.as_ref(),
                self.reserve.available_reserve(),
                now,
            );
            tx.check_epoch()
                .and_then(|()| op(&mut tx))
                .map(|value| (value, tx.into_parts()))
        };
        let (value, (effects, events)) = match outcome {
            Ok(done) => done,
            Err(err) => {
                debug!(error = %err, now, "transaction rolled back");
                return Err(err);
            }
        };

        for effect in &effects {
            if let Err(err) = apply_effect(&mut custody, &mut reserve, effect) {
                debug!(error = %err, ?effect, "effect failed; transaction rolled back");
                return Err(err);
            }
        }

        self.state = staged;
        self.custody = custody;
        self.reserve = reserve;
        for event in &events {
            for observer in &self.observers {
                observer.notify(event);
            }
        }
        Ok(value)
    }

    /// Mark the pool ready for business. Owner only, once.
    pub fn initialize(&mut self, caller: Address, now: u64) -> Result<()> {
        self.transact(now, |tx| tx.initialize(caller))
    }

    /// Run the epoch check alone.
    pub fn poke(&mut self, now: u64) -> Result<EpochId> {
        self.transact(now, |tx| Ok(tx.current_epoch()))
    }

    /// Deposit liquidity; the position starts earning next epoch.
    pub fn open_position(&mut self, caller: Address, principal: Amount, now: u64) -> Result<PositionId> {
        self.transact(now, |tx| tx.open_position(caller, caller, principal))
    }

    /// Deposit through the mining proxy on behalf of `owner`.
    pub fn open_via_proxy(
        &mut self,
        caller: Address,
        owner: Address,
        principal: Amount,
        now: u64,
    ) -> Result<PositionId> {
        self.transact(now, |tx| tx.open_via_proxy(caller, owner, principal))
    }

    pub fn set_mining_proxy(&mut self, caller: Address, proxy: Address, now: u64) -> Result<()> {
        self.transact(now, |tx| tx.set_mining_proxy(caller, proxy))
    }

    pub fn claim_rewards(&mut self, caller: Address, id: PositionId, now: u64) -> Result<Amount> {
        self.transact(now, |tx| tx.claim_rewards(caller, id))
    }

    /// Stop backing new policies. Returns the exit epoch.
    pub fn signal_exit(&mut self, caller: Address, id: PositionId, now: u64) -> Result<EpochId> {
        self.transact(now, |tx| tx.signal_exit(caller, id))
    }

    /// Signal exit and, when `immediate`, withdraw in the same call.
    ///
    /// An immediate exit only succeeds when no live policy holds shadow on
    /// the position. Returns the released amount for immediate exits.
    pub fn exit(
        &mut self,
        caller: Address,
        id: PositionId,
        immediate: bool,
        now: u64,
    ) -> Result<Option<Amount>> {
        self.transact(now, |tx| {
            if !tx.state.position(id)?.has_exited() || !immediate {
                tx.signal_exit(caller, id)?;
            }
            if immediate {
                tx.withdraw(caller, id, false).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Release principal minus losses plus unclaimed rewards.
    pub fn withdraw_after_exit(&mut self, caller: Address, id: PositionId, now: u64) -> Result<Amount> {
        self.transact(now, |tx| tx.withdraw(caller, id, true))
    }

    pub fn transfer_position(
        &mut self,
        caller: Address,
        id: PositionId,
        to: Address,
        now: u64,
    ) -> Result<()> {
        self.transact(now, |tx| tx.transfer_position(caller, id, to))
    }

    /// Buy cover for `beneficiary`; the caller pays premium and deposit.
    pub fn mint_policy(
        &mut self,
        caller: Address,
        beneficiary: Address,
        terms: CoverTerms,
        now: u64,
    ) -> Result<PolicyId> {
        self.transact(now, |tx| tx.mint_policy(caller, beneficiary, terms))
    }

    pub fn claim_apply(&mut self, caller: Address, id: PolicyId, now: u64) -> Result<()> {
        self.transact(now, |tx| tx.claim_apply(caller, id))
    }

    /// Pay a claim. Judger only. Returns the payout.
    pub fn approve_apply(&mut self, caller: Address, id: PolicyId, now: u64) -> Result<Amount> {
        self.transact(now, |tx| tx.approve_apply(caller, id))
    }

    pub fn refuse_apply(&mut self, caller: Address, id: PolicyId, now: u64) -> Result<()> {
        self.transact(now, |tx| tx.refuse_apply(caller, id))
    }

    /// Settle an expired policy. Returns the settlement fee paid to the caller.
    pub fn settle(&mut self, caller: Address, id: PolicyId, now: u64) -> Result<Amount> {
        self.transact(now, |tx| tx.settle(caller, id))
    }

    /// Cancel a policy before it enters force. Returns the refund.
    pub fn cancel_policy(&mut self, caller: Address, id: PolicyId, now: u64) -> Result<Amount> {
        self.transact(now, |tx| tx.cancel_policy(caller, id))
    }

    pub fn update_risk_parameters(
        &mut self,
        caller: Address,
        max_insurable_bps: u32,
        initial_risk_bps: u32,
        risk_slope_bps: u32,
        now: u64,
    ) -> Result<()> {
        self.transact(now, |tx| {
            tx.update_risk_parameters(caller, max_insurable_bps, initial_risk_bps, risk_slope_bps)
        })
    }

    pub fn set_standard_risk(&mut self, caller: Address, standard_risk: Amount, now: u64) -> Result<()> {
        self.transact(now, |tx| tx.set_standard_risk(caller, standard_risk))
    }

    /// Rewards, shadow and losses of a position as of `now`.
    pub fn exposure(&self, id: PositionId, now: u64) -> Result<PositionExposure> {
        let accumulator = self.state.accumulator_at(now)?;
        self.state.exposure_of(self.state.position(id)?, &accumulator)
    }

    pub fn get_rewards(&self, id: PositionId, now: u64) -> Result<Amount> {
        Ok(self.exposure(id, now)?.rewards)
    }

    pub fn get_shadow_locked(&self, id: PositionId, now: u64) -> Result<Amount> {
        Ok(self.exposure(id, now)?.shadow_locked)
    }

    pub fn get_losses(&self, id: PositionId, now: u64) -> Result<Amount> {
        Ok(self.exposure(id, now)?.losses)
    }

    pub fn withdrawable(&self, id: PositionId, now: u64) -> Result<Amount> {
        Ok(self.exposure(id, now)?.withdrawable)
    }

    /// Price a cover without buying it.
    pub fn quote_premium(&self, terms: &CoverTerms) -> Result<CoverQuote> {
        self.state.quote_cover(self.pricing.as_ref(), terms)
    }

    /// Pool totals as an epoch check at `now` would leave them.
    pub fn pool_summary(&self, now: u64) -> Result<PoolSummary> {
        let mut accumulator = self.state.accumulator.clone();
        let report = accumulator.check_and_advance(now, self.state.config.reserve_premium_bps)?;
        let latest = accumulator.latest();
        let liquidity = accumulator.liquidity();
        let (total_liquidity_last_epoch, k_last) = if report.is_noop() {
            (self.state.total_liquidity_last_epoch, self.state.k_last)
        } else {
            (liquidity.total, self.state.locked_coverage)
        };
        Ok(PoolSummary {
            current_epoch: latest.epoch_id,
            total_liquidity: liquidity.total,
            earning_liquidity: liquidity.earning,
            pending_entry: liquidity.pending_entry,
            total_liquidity_last_epoch,
            k_last,
            locked_coverage: self.state.locked_coverage,
            standard_risk: self.state.standard_risk,
            acc_rps: latest.acc_rps,
            acc_sps: latest.acc_sps,
            pending_premium: accumulator.pending_premium(),
            reserve_available: self
                .reserve
                .available_reserve()
                .saturating_add(report.reserve_credit),
            positions: self.state.positions.len(),
            policies: self.state.policies.len(),
        })
    }
}

fn apply_effect<C, R>(custody: &mut C, reserve: &mut R, effect: &Effect) -> Result<()>
where
    C: AssetCustody,
    R: RiskReserve,
{
    match effect {
        Effect::TransferIn { from, amount } => custody.transfer_in(from, *amount)?,
        Effect::TransferOut { to, amount } => custody.transfer_out(to, *amount)?,
        Effect::DrawReserve(amount) => {
            reserve.draw_from(*amount)?;
            custody.transfer_in(&reserve.account(), *amount)?;
        }
        Effect::ReplenishReserve(amount) => {
            custody.transfer_out(&reserve.account(), *amount)?;
            reserve.replenish(*amount)?;
        }
    }
    Ok(())
}
