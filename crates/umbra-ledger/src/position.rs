//! Liquidity positions (certificates).
//!
//! A position deposited during epoch `e` enters at `e + 1`: it earns premiums
//! accrued from that epoch on and backs every policy entering force from that
//! epoch on. Signalling exit during epoch `x` sets `exited_epoch = x + 1`,
//! the first epoch whose entering policies the position no longer backs.
//! Policies entering in `entered_epoch ..= exited_epoch - 1` keep their
//! claim on the position until they settle.
//!
//! ```text
//! rewards = principal * (accRPS[end] - accRPS[reward_debt])
//! shadow  = principal * Σ live SPS of policies entering in the window
//! losses  = principal * Σ loss-per-share of paid policies in the window
//! ```
//!
//! Losses round up and rewards round down, so the pool always holds what it
//! owes.

use serde::{Deserialize, Serialize};
use tracing::info;
use umbra_epoch::accumulator::GlobalAccumulator;
use umbra_epoch::index::EpochIndexedSum;
use umbra_types::events::PoolEvent;
use umbra_types::math::{apply_per_share, apply_per_share_ceil};
use umbra_types::{Address, Amount, EpochId, PositionId};

use crate::tx::{Effect, Tx};
use crate::{LedgerError, Result};

/// A liquidity provider's stake record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Sequential id.
    pub id: PositionId,
    /// Deposited liquidity.
    pub principal: Amount,
    /// First epoch the position earns and backs policies in.
    pub entered_epoch: EpochId,
    /// First epoch the position no longer backs new policies (0 = active).
    pub exited_epoch: EpochId,
    /// Epoch up to which rewards have been paid.
    pub reward_debt_epoch: EpochId,
    /// False once the liquidity has been withdrawn.
    pub is_valid: bool,
    /// Deposit timestamp.
    pub opened_at: u64,
}

impl Position {
    /// Whether exit has been signalled.
    pub fn has_exited(&self) -> bool {
        self.exited_epoch != 0
    }

    /// Whether the position still counts towards total liquidity.
    pub fn is_active(&self) -> bool {
        self.is_valid && !self.has_exited()
    }

    /// Last epoch whose accRPS the position has earned up to.
    pub fn reward_end(&self, current: EpochId) -> EpochId {
        if self.has_exited() {
            (self.exited_epoch - 1).min(current)
        } else {
            current
        }
    }

    /// Inclusive range of policy entry epochs this position backs, as seen
    /// at `current`. `None` before the position has entered.
    pub fn exposure_window(&self, current: EpochId) -> Option<(EpochId, EpochId)> {
        let end = self.reward_end(current);
        (end >= self.entered_epoch).then_some((self.entered_epoch, end))
    }

    /// Rewards earned since the last claim.
    pub fn pending_rewards(&self, accumulator: &GlobalAccumulator) -> Result<Amount> {
        let end = self.reward_end(accumulator.current_epoch());
        if end <= self.reward_debt_epoch {
            return Ok(0);
        }
        let delta = accumulator
            .acc_rps_at(end)?
            .checked_sub(accumulator.acc_rps_at(self.reward_debt_epoch)?)
            .ok_or(LedgerError::Overflow)?;
        apply_per_share(self.principal, delta).ok_or(LedgerError::Overflow)
    }

    /// Shadow owed to live policies backed by this position, uncapped.
    pub fn gross_shadow(&self, current: EpochId, live_shadow: &EpochIndexedSum) -> Result<Amount> {
        match self.exposure_window(current) {
            Some((from, to)) => apply_per_share(self.principal, live_shadow.range_sum(from, to))
                .ok_or(LedgerError::Overflow),
            None => Ok(0),
        }
    }

    /// Whether any policy entering inside the window still holds shadow.
    pub fn backs_live_policy(&self, current: EpochId, live_shadow: &EpochIndexedSum) -> bool {
        self.exposure_window(current)
            .is_some_and(|(from, to)| live_shadow.range_sum(from, to) > 0)
    }

    /// Crystallized losses from paid claims, capped at principal.
    pub fn losses(&self, current: EpochId, loss_index: &EpochIndexedSum) -> Result<Amount> {
        match self.exposure_window(current) {
            Some((from, to)) => {
                let loss = apply_per_share_ceil(self.principal, loss_index.range_sum(from, to))
                    .ok_or(LedgerError::Overflow)?;
                Ok(loss.min(self.principal))
            }
            None => Ok(0),
        }
    }
}

impl Tx<'_> {
    pub(crate) fn open_position(
        &mut self,
        payer: Address,
        owner: Address,
        principal: Amount,
    ) -> Result<PositionId> {
        self.require_initialized()?;
        if owner.is_zero() || payer.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        let minimum = self.state.config.min_liquidity;
        if principal < minimum {
            return Err(LedgerError::InsufficientLiquidity {
                provided: principal,
                minimum,
            });
        }

        let id = self.state.next_position_id;
        self.state.next_position_id += 1;
        let entered_epoch = self.current_epoch() + 1;

        self.state.accumulator.add_entry(principal)?;
        self.state.ownership.assign(id, owner)?;
        self.state.positions.insert(
            id,
            Position {
                id,
                principal,
                entered_epoch,
                exited_epoch: 0,
                reward_debt_epoch: entered_epoch,
                is_valid: true,
                opened_at: self.now,
            },
        );

        self.effect(Effect::TransferIn {
            from: payer,
            amount: principal,
        });
        self.emit(PoolEvent::PositionOpened {
            position: id,
            owner,
            principal,
            entered_epoch,
        });
        info!(position = id, %owner, principal, entered_epoch, "position opened");
        Ok(id)
    }

    pub(crate) fn claim_rewards(&mut self, caller: Address, id: PositionId) -> Result<Amount> {
        self.state.ownership.require_owner(id, &caller)?;
        let current = self.current_epoch();
        let position = self.state.position(id)?;
        let reward = position.pending_rewards(&self.state.accumulator)?;
        if reward == 0 {
            return Err(LedgerError::NoRewards);
        }
        let end = position.reward_end(current);
        self.state.position_mut(id)?.reward_debt_epoch = end;

        self.effect(Effect::TransferOut {
            to: caller,
            amount: reward,
        });
        self.emit(PoolEvent::RewardsClaimed {
            position: id,
            owner: caller,
            amount: reward,
            epoch: end,
        });
        info!(position = id, reward, epoch = end, "rewards claimed");
        Ok(reward)
    }

    pub(crate) fn signal_exit(&mut self, caller: Address, id: PositionId) -> Result<EpochId> {
        self.state.ownership.require_owner(id, &caller)?;
        let current = self.current_epoch();
        let position = self.state.position(id)?;
        if !position.is_active() {
            return Err(LedgerError::CertificateExit);
        }
        let principal = position.principal;
        let pending = position.entered_epoch > current;

        if pending {
            self.state.accumulator.cancel_entry(principal)?;
        } else {
            self.state.accumulator.remove_earning(principal)?;
        }
        let exited_epoch = current + 1;
        self.state.position_mut(id)?.exited_epoch = exited_epoch;

        self.emit(PoolEvent::PositionExitSignalled {
            position: id,
            exited_epoch,
        });
        info!(position = id, exited_epoch, pending, "position exit signalled");
        Ok(exited_epoch)
    }

    /// Release an exited position's liquidity. `require_finalized` demands
    /// that the exit epoch has been reached.
    pub(crate) fn withdraw(
        &mut self,
        caller: Address,
        id: PositionId,
        require_finalized: bool,
    ) -> Result<Amount> {
        self.state.ownership.require_owner(id, &caller)?;
        let current = self.current_epoch();
        let position = self.state.position(id)?;
        if !position.is_valid {
            return Err(LedgerError::CertificateExit);
        }
        if !position.has_exited() || (require_finalized && current < position.exited_epoch) {
            return Err(LedgerError::CertificateNotExit);
        }

        if position.backs_live_policy(current, &self.state.live_shadow) {
            let gross = position.gross_shadow(current, &self.state.live_shadow)?;
            return Err(LedgerError::LiquidityStillLocked {
                locked: gross.min(position.principal),
            });
        }
        let exposure = self.state.exposure_of(position, &self.state.accumulator)?;
        let released = exposure
            .principal
            .checked_sub(exposure.losses)
            .and_then(|net| net.checked_add(exposure.rewards))
            .ok_or(LedgerError::Overflow)?;
        let end = position.reward_end(current);

        let position = self.state.position_mut(id)?;
        position.is_valid = false;
        position.reward_debt_epoch = position.reward_debt_epoch.max(end);

        self.effect(Effect::TransferOut {
            to: caller,
            amount: released,
        });
        self.emit(PoolEvent::PositionWithdrawn {
            position: id,
            owner: caller,
            released,
            losses: exposure.losses,
        });
        info!(
            position = id,
            released,
            losses = exposure.losses,
            rewards = exposure.rewards,
            "position withdrawn"
        );
        Ok(released)
    }

    pub(crate) fn transfer_position(
        &mut self,
        caller: Address,
        id: PositionId,
        to: Address,
    ) -> Result<()> {
        if !self.state.position(id)?.is_valid {
            return Err(LedgerError::CertificateExit);
        }
        self.state.ownership.transfer(id, &caller, to)?;
        self.emit(PoolEvent::PositionTransferred {
            position: id,
            from: caller,
            to,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use umbra_epoch::clock::EpochClock;
    use umbra_types::{units, PRECISION};

    use super::*;

    const DAY: u64 = 86_400;

    fn position(entered: EpochId, exited: EpochId) -> Position {
        Position {
            id: 1,
            principal: units(1_000),
            entered_epoch: entered,
            exited_epoch: exited,
            reward_debt_epoch: entered,
            is_valid: true,
            opened_at: 0,
        }
    }

    #[test]
    fn test_exposure_window_active() {
        let p = position(2, 0);
        assert_eq!(p.exposure_window(1), None);
        assert_eq!(p.exposure_window(2), Some((2, 2)));
        assert_eq!(p.exposure_window(9), Some((2, 9)));
    }

    #[test]
    fn test_exposure_window_exited() {
        // Signalled during epoch 5.
        let p = position(2, 6);
        assert_eq!(p.exposure_window(5), Some((2, 5)));
        assert_eq!(p.exposure_window(30), Some((2, 5)));
        assert_eq!(p.reward_end(30), 5);
    }

    #[test]
    fn test_exit_before_entry_has_no_window() {
        let p = position(4, 4);
        assert_eq!(p.exposure_window(3), None);
        assert_eq!(p.exposure_window(10), None);
    }

    #[test]
    fn test_rewards_zero_until_epoch_elapses() {
        let mut acc = GlobalAccumulator::new(EpochClock::daily(0));
        acc.add_entry(units(1_000)).expect("entry");
        acc.check_and_advance(DAY, 0).expect("advance");
        let p = position(1, 0);
        assert_eq!(p.pending_rewards(&acc).expect("rewards"), 0);

        acc.accrue_premium(units(5)).expect("premium");
        acc.check_and_advance(2 * DAY, 0).expect("advance");
        assert_eq!(p.pending_rewards(&acc).expect("rewards"), units(5));
    }

    #[test]
    fn test_shadow_and_losses_use_window() {
        let mut live = EpochIndexedSum::new();
        live.add(1, PRECISION / 10).expect("add");
        live.add(3, PRECISION / 10).expect("add");
        live.add(7, PRECISION / 10).expect("add");

        let p = position(2, 6);
        // Only the policy entering at 3 falls in 2..=5.
        assert_eq!(p.gross_shadow(10, &live).expect("shadow"), units(100));

        let mut losses = EpochIndexedSum::new();
        losses.add(3, 2 * PRECISION).expect("add");
        assert_eq!(p.losses(10, &losses).expect("losses"), units(1_000));
    }

    #[test]
    fn test_losses_round_up() {
        let mut losses = EpochIndexedSum::new();
        losses.add(2, PRECISION / 3).expect("add");
        let p = position(2, 0);
        // 1000 units / 3 leaves a remainder; the position is charged the extra micro-unit.
        assert_eq!(p.losses(2, &losses).expect("losses"), 333_333_334);
    }

    #[test]
    fn test_backs_live_policy_ignores_losses() {
        let mut live = EpochIndexedSum::new();
        live.add(3, 1).expect("add");
        let p = position(2, 6);
        assert!(p.backs_live_policy(4, &live));
        // One unit of SPS rounds to zero shadow but still pins the position.
        assert_eq!(p.gross_shadow(4, &live).expect("shadow"), 0);
        assert!(!position(4, 0).backs_live_policy(9, &live));
    }
}
