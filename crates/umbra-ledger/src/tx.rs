//! Transaction context.
//!
//! A [`Tx`] wraps a staged copy of the pool state for the duration of one
//! call. Operations mutate the staged state and queue custody effects and
//! events; the engine executes effects and commits only after the operation
//! returned `Ok`.

use tracing::info;
use umbra_pricing::PricingOracle;
use umbra_types::events::PoolEvent;
use umbra_types::{Address, Amount, EpochId};

use crate::collaborators::Authority;
use crate::state::PoolState;
use crate::{LedgerError, Result};

/// A deferred external side effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Effect {
    TransferIn { from: Address, amount: Amount },
    TransferOut { to: Address, amount: Amount },
    DrawReserve(Amount),
    ReplenishReserve(Amount),
}

impl Effect {
    fn amount(&self) -> Amount {
        match self {
            Effect::TransferIn { amount, .. } | Effect::TransferOut { amount, .. } => *amount,
            Effect::DrawReserve(amount) | Effect::ReplenishReserve(amount) => *amount,
        }
    }
}

pub(crate) struct Tx<'a> {
    pub(crate) state: &'a mut PoolState,
    pub(crate) authority: &'a dyn Authority,
    pub(crate) pricing: &'a dyn PricingOracle,
    pub(crate) reserve_available: Amount,
    pub(crate) now: u64,
    effects: Vec<Effect>,
    events: Vec<PoolEvent>,
}

impl<'a> Tx<'a> {
    pub(crate) fn new(
        state: &'a mut PoolState,
        authority: &'a dyn Authority,
        pricing: &'a dyn PricingOracle,
        reserve_available: Amount,
        now: u64,
    ) -> Self {
        Self {
            state,
            authority,
            pricing,
            reserve_available,
            now,
            effects: Vec::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn current_epoch(&self) -> EpochId {
        self.state.accumulator.current_epoch()
    }

    pub(crate) fn effect(&mut self, effect: Effect) {
        if effect.amount() > 0 {
            self.effects.push(effect);
        }
    }

    pub(crate) fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    pub(crate) fn into_parts(self) -> (Vec<Effect>, Vec<PoolEvent>) {
        (self.effects, self.events)
    }

    /// Finalize crossed epoch boundaries. Runs before every operation.
    pub(crate) fn check_epoch(&mut self) -> Result<()> {
        let reserve_bps = self.state.config.reserve_premium_bps;
        let report = self
            .state
            .accumulator
            .check_and_advance(self.now, reserve_bps)?;
        if report.is_noop() {
            return Ok(());
        }

        self.state.total_liquidity_last_epoch = self.state.accumulator.liquidity().total;
        self.state.k_last = self.state.locked_coverage;

        for epoch in report.new_epochs() {
            let record = self.state.accumulator.record(epoch)?;
            self.events.push(PoolEvent::EpochAdvanced {
                epoch,
                acc_rps: record.acc_rps,
                acc_sps: record.acc_sps,
                total_liquidity: record.total_liquidity,
            });
        }
        self.effect(Effect::ReplenishReserve(report.reserve_credit));
        self.reserve_available = self.reserve_available.saturating_add(report.reserve_credit);

        info!(
            from = report.from_epoch,
            to = report.to_epoch,
            distributed = report.distributed,
            reserve_credit = report.reserve_credit,
            "epoch advanced"
        );
        Ok(())
    }

    pub(crate) fn require_initialized(&self) -> Result<()> {
        if !self.state.initialized {
            return Err(LedgerError::NotInitialized);
        }
        Ok(())
    }

    pub(crate) fn require_owner_role(&self, caller: &Address) -> Result<()> {
        if !self.authority.is_owner(caller) {
            return Err(LedgerError::InsufficientPrivilege);
        }
        Ok(())
    }

    pub(crate) fn require_judger(&self, caller: &Address) -> Result<()> {
        if !self.authority.is_judger(caller) {
            return Err(LedgerError::InsufficientPrivilege);
        }
        Ok(())
    }

    pub(crate) fn require_official(&self, caller: &Address) -> Result<()> {
        if !self.authority.is_official(caller) {
            return Err(LedgerError::InsufficientPrivilege);
        }
        Ok(())
    }
}
