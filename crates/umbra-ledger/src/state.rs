//! Pool state and snapshots.
//!
//! [`PoolState`] is a plain value: every mutation happens on a staged clone
//! inside a transaction, and the engine swaps it in only on success.
//! [`PoolSnapshot`] is its flattened, persistence-friendly form.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use umbra_epoch::accumulator::{EpochRecord, GlobalAccumulator, LiquidityTotals};
use umbra_epoch::clock::EpochClock;
use umbra_epoch::index::EpochIndexedSum;
use umbra_types::{Address, Amount, PolicyId, PositionId};

use crate::config::PoolConfig;
use crate::ownership::OwnershipTable;
use crate::policy::Policy;
use crate::position::Position;
use crate::{LedgerError, Result};

/// Derived view of one position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionExposure {
    /// Position id.
    pub position: PositionId,
    /// Deposited liquidity.
    pub principal: Amount,
    /// Unclaimed rewards.
    pub rewards: Amount,
    /// Liquidity locked behind live policies.
    pub shadow_locked: Amount,
    /// Losses charged from paid claims.
    pub losses: Amount,
    /// Principal that is neither lost nor locked.
    pub withdrawable: Amount,
}

/// Complete mutable pool state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolState {
    pub(crate) config: PoolConfig,
    pub(crate) accumulator: GlobalAccumulator,
    pub(crate) positions: BTreeMap<PositionId, Position>,
    pub(crate) policies: BTreeMap<PolicyId, Policy>,
    pub(crate) ownership: OwnershipTable,
    /// Live SPS keyed by policy entry epoch.
    pub(crate) live_shadow: EpochIndexedSum,
    /// Loss per share keyed by policy entry epoch.
    pub(crate) losses: EpochIndexedSum,
    pub(crate) next_position_id: PositionId,
    pub(crate) next_policy_id: PolicyId,
    pub(crate) total_liquidity_last_epoch: Amount,
    pub(crate) k_last: Amount,
    /// Coverage of every unsettled policy.
    pub(crate) locked_coverage: Amount,
    pub(crate) standard_risk: Amount,
    pub(crate) initialized: bool,
    pub(crate) mining_proxy: Option<Address>,
}

/// Flattened [`PoolState`] for storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub config: PoolConfig,
    pub epochs: Vec<EpochRecord>,
    pub liquidity: LiquidityTotals,
    pub pending_premium: Amount,
    pub pending_sps: u128,
    pub positions: Vec<Position>,
    pub owners: Vec<(PositionId, Address)>,
    pub policies: Vec<Policy>,
    pub live_shadow: Vec<u128>,
    pub losses: Vec<u128>,
    pub next_position_id: PositionId,
    pub next_policy_id: PolicyId,
    pub total_liquidity_last_epoch: Amount,
    pub k_last: Amount,
    pub locked_coverage: Amount,
    pub standard_risk: Amount,
    pub initialized: bool,
    pub mining_proxy: Option<Address>,
}

impl PoolState {
    /// Fresh, uninitialized state.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidParameter`] if the config is invalid
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let clock = EpochClock::new(config.genesis_timestamp, config.epoch_length_secs)?;
        Ok(Self {
            standard_risk: config.standard_risk,
            config,
            accumulator: GlobalAccumulator::new(clock),
            positions: BTreeMap::new(),
            policies: BTreeMap::new(),
            ownership: OwnershipTable::new(),
            live_shadow: EpochIndexedSum::new(),
            losses: EpochIndexedSum::new(),
            next_position_id: 1,
            next_policy_id: 1,
            total_liquidity_last_epoch: 0,
            k_last: 0,
            locked_coverage: 0,
            initialized: false,
            mining_proxy: None,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn accumulator(&self) -> &GlobalAccumulator {
        &self.accumulator
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn live_shadow(&self) -> &EpochIndexedSum {
        &self.live_shadow
    }

    pub fn loss_index(&self) -> &EpochIndexedSum {
        &self.losses
    }

    pub fn total_liquidity(&self) -> Amount {
        self.accumulator.liquidity().total
    }

    pub fn total_liquidity_last_epoch(&self) -> Amount {
        self.total_liquidity_last_epoch
    }

    pub fn k_last(&self) -> Amount {
        self.k_last
    }

    pub fn locked_coverage(&self) -> Amount {
        self.locked_coverage
    }

    pub fn standard_risk(&self) -> Amount {
        self.standard_risk
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mining_proxy(&self) -> Option<Address> {
        self.mining_proxy
    }

    /// Look up a position.
    pub fn position(&self, id: PositionId) -> Result<&Position> {
        self.positions
            .get(&id)
            .ok_or(LedgerError::PositionNotFound(id))
    }

    /// Look up a policy.
    pub fn policy(&self, id: PolicyId) -> Result<&Policy> {
        self.policies.get(&id).ok_or(LedgerError::PolicyNotFound(id))
    }

    pub(crate) fn position_mut(&mut self, id: PositionId) -> Result<&mut Position> {
        self.positions
            .get_mut(&id)
            .ok_or(LedgerError::PositionNotFound(id))
    }

    pub(crate) fn policy_mut(&mut self, id: PolicyId) -> Result<&mut Policy> {
        self.policies
            .get_mut(&id)
            .ok_or(LedgerError::PolicyNotFound(id))
    }

    /// Principal of every position that still counts as liquidity.
    pub fn active_principal(&self) -> Amount {
        self.positions
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.principal)
            .sum()
    }

    /// The accumulator as it would look after an epoch check at `now`.
    ///
    /// Views use this so they report boundary values without mutating state.
    pub fn accumulator_at(&self, now: u64) -> Result<Cow<'_, GlobalAccumulator>> {
        let target = self.accumulator.clock().epoch_index_of(now)?;
        if target <= self.accumulator.current_epoch() {
            return Ok(Cow::Borrowed(&self.accumulator));
        }
        let mut advanced = self.accumulator.clone();
        advanced.check_and_advance(now, self.config.reserve_premium_bps)?;
        Ok(Cow::Owned(advanced))
    }

    /// Rewards, shadow and losses of a position against `accumulator`.
    pub fn exposure_of(
        &self,
        position: &Position,
        accumulator: &GlobalAccumulator,
    ) -> Result<PositionExposure> {
        if !position.is_valid {
            return Ok(PositionExposure {
                position: position.id,
                principal: position.principal,
                ..PositionExposure::default()
            });
        }
        let current = accumulator.current_epoch();
        let losses = position.losses(current, &self.losses)?;
        let net = position.principal - losses;
        let shadow_locked = position.gross_shadow(current, &self.live_shadow)?.min(net);
        Ok(PositionExposure {
            position: position.id,
            principal: position.principal,
            rewards: position.pending_rewards(accumulator)?,
            shadow_locked,
            losses,
            withdrawable: net - shadow_locked,
        })
    }

    /// Flatten for storage.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            config: self.config.clone(),
            epochs: self.accumulator.epochs().to_vec(),
            liquidity: self.accumulator.liquidity().clone(),
            pending_premium: self.accumulator.pending_premium(),
            pending_sps: self.accumulator.pending_sps(),
            positions: self.positions.values().cloned().collect(),
            owners: self.ownership.iter().collect(),
            policies: self.policies.values().cloned().collect(),
            live_shadow: self.live_shadow.values().to_vec(),
            losses: self.losses.values().to_vec(),
            next_position_id: self.next_position_id,
            next_policy_id: self.next_policy_id,
            total_liquidity_last_epoch: self.total_liquidity_last_epoch,
            k_last: self.k_last,
            locked_coverage: self.locked_coverage,
            standard_risk: self.standard_risk,
            initialized: self.initialized,
            mining_proxy: self.mining_proxy,
        }
    }

    /// Rebuild from a snapshot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidParameter`] if the snapshot is inconsistent
    pub fn restore(snapshot: PoolSnapshot) -> Result<Self> {
        snapshot.config.validate()?;
        let clock = EpochClock::new(
            snapshot.config.genesis_timestamp,
            snapshot.config.epoch_length_secs,
        )?;
        let accumulator = GlobalAccumulator::restore(
            clock,
            snapshot.epochs,
            snapshot.liquidity,
            snapshot.pending_premium,
            snapshot.pending_sps,
        )?;

        let mut ownership = OwnershipTable::new();
        for (id, owner) in snapshot.owners {
            ownership.assign(id, owner)?;
        }
        let positions: BTreeMap<_, _> = snapshot.positions.into_iter().map(|p| (p.id, p)).collect();
        if positions.keys().any(|id| ownership.owner_of(*id).is_err()) {
            return Err(LedgerError::InvalidParameter("position without owner"));
        }
        let policies = snapshot.policies.into_iter().map(|p| (p.id, p)).collect();

        let state = Self {
            config: snapshot.config,
            accumulator,
            positions,
            policies,
            ownership,
            live_shadow: EpochIndexedSum::from_values(snapshot.live_shadow)?,
            losses: EpochIndexedSum::from_values(snapshot.losses)?,
            next_position_id: snapshot.next_position_id,
            next_policy_id: snapshot.next_policy_id,
            total_liquidity_last_epoch: snapshot.total_liquidity_last_epoch,
            k_last: snapshot.k_last,
            locked_coverage: snapshot.locked_coverage,
            standard_risk: snapshot.standard_risk,
            initialized: snapshot.initialized,
            mining_proxy: snapshot.mining_proxy,
        };
        if state.active_principal() != state.total_liquidity() {
            return Err(LedgerError::InvalidParameter("total liquidity mismatch"));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use umbra_types::units;

    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = PoolState::new(PoolConfig::default()).expect("state");
        assert!(!state.is_initialized());
        assert_eq!(state.total_liquidity(), 0);
        assert_eq!(state.accumulator().current_epoch(), 0);
        assert_eq!(state.next_position_id, 1);
        assert!(matches!(
            state.position(1),
            Err(LedgerError::PositionNotFound(1))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PoolConfig {
            epoch_length_secs: 0,
            ..PoolConfig::default()
        };
        assert_eq!(
            PoolState::new(config),
            Err(LedgerError::InvalidParameter("epoch_length_secs"))
        );
    }

    #[test]
    fn test_accumulator_at_does_not_mutate() {
        let mut state = PoolState::new(PoolConfig::default()).expect("state");
        state.accumulator.add_entry(units(100)).expect("entry");
        let view = state.accumulator_at(3 * 86_400).expect("view");
        assert_eq!(view.current_epoch(), 3);
        assert_eq!(view.liquidity().earning, units(100));
        assert_eq!(state.accumulator().current_epoch(), 0);
        assert!(matches!(
            state.accumulator_at(0).expect("view"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_snapshot_restore_identity() {
        let mut state = PoolState::new(PoolConfig::default()).expect("state");
        state.initialized = true;
        state.accumulator.add_entry(units(50)).expect("entry");
        state.ownership.assign(1, Address::repeat_byte(1)).expect("assign");
        state.positions.insert(
            1,
            Position {
                id: 1,
                principal: units(50),
                entered_epoch: 1,
                exited_epoch: 0,
                reward_debt_epoch: 1,
                is_valid: true,
                opened_at: 5,
            },
        );
        state.next_position_id = 2;
        state.live_shadow.add(3, 42).expect("add");

        let restored = PoolState::restore(state.snapshot()).expect("restore");
        assert_eq!(restored, state);
    }

    #[test]
    fn test_restore_rejects_liquidity_mismatch() {
        let mut state = PoolState::new(PoolConfig::default()).expect("state");
        state.accumulator.add_entry(units(50)).expect("entry");
        assert_eq!(
            PoolState::restore(state.snapshot()),
            Err(LedgerError::InvalidParameter("total liquidity mismatch"))
        );
    }
}
