//! Exposure ledger: policy minting, claims, settlement and cancellation.
//!
//! A policy minted during epoch `e` enters force at `e + 1`. Its SPS is
//! recorded twice: in the accumulator's pending SPS (folded into the gross
//! accSPS series at the boundary) and in the live shadow index under its
//! entry epoch, from which it is removed when the policy stops holding
//! shadow.
//!
//! An approved claim is paid from the risk reserve first. The remainder is
//! charged to the positions that earned during the policy's entry epoch,
//! pro rata to principal, through the loss index. No backing position is
//! charged past its principal across all the epochs it backs; whatever that
//! cap leaves unpaid stays unpaid.

use tracing::{info, warn};
use umbra_pricing::risk::risk_level;
use umbra_pricing::{PremiumQuote, PricingOracle};
use umbra_types::events::PoolEvent;
use umbra_types::math::{apply_per_share, bps_of, bps_to_fraction, per_share};
use umbra_types::{Address, Amount, EpochId, PolicyId, PRECISION};

use crate::policy::{CoverQuote, CoverTerms, Policy, PolicyStatus};
use crate::state::PoolState;
use crate::tx::{Effect, Tx};
use crate::{LedgerError, Result};

impl PoolState {
    /// Price a cover against the current pool.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidParameter`] for zero coverage or a duration
    ///   outside `1..=max_duration_days`
    /// - [`LedgerError::CoverageTooLarge`] above the insurable share
    /// - [`LedgerError::Pricing`] if the oracle refuses the quote
    pub fn quote_cover(&self, pricing: &dyn PricingOracle, terms: &CoverTerms) -> Result<CoverQuote> {
        if terms.coverage == 0 {
            return Err(LedgerError::InvalidParameter("coverage"));
        }
        if terms.duration_days == 0 || terms.duration_days > self.config.max_duration_days {
            return Err(LedgerError::InvalidParameter("duration_days"));
        }
        let total = self.total_liquidity();
        let max_coverage =
            bps_of(total, self.config.max_insurable_bps).ok_or(LedgerError::Overflow)?;
        if terms.coverage > max_coverage {
            return Err(LedgerError::CoverageTooLarge {
                coverage: terms.coverage,
                maximum: max_coverage,
            });
        }

        let params = self.config.risk_parameters(self.standard_risk);
        let risk_level = risk_level(terms.coverage, &params)?;
        let fee = pricing.premium(&PremiumQuote {
            coverage: terms.coverage,
            duration_days: terms.duration_days,
            risk_level,
            spot: terms.spot,
            strike: terms.strike,
            free_rate: bps_to_fraction(self.config.free_rate_bps),
        })?;
        let sps = per_share(terms.coverage, total).ok_or(LedgerError::Overflow)?;

        Ok(CoverQuote {
            risk_level,
            fee,
            settle_fee: self.config.settle_fee,
            sps,
            max_coverage,
        })
    }

    /// Principal backing policies that entered at `entry`, and the largest
    /// loss per share every one of those positions can still absorb.
    fn backing(&self, entry: EpochId, current: EpochId) -> Result<(Amount, u128)> {
        let mut covering: Amount = 0;
        let mut headroom = PRECISION;
        for position in self.positions.values().filter(|p| p.is_valid) {
            let (from, to) = match position.exposure_window(current) {
                Some(window) if (window.0..=window.1).contains(&entry) => window,
                _ => continue,
            };
            covering = covering
                .checked_add(position.principal)
                .ok_or(LedgerError::Overflow)?;
            headroom = headroom.min(PRECISION.saturating_sub(self.losses.range_sum(from, to)));
        }
        Ok((covering, headroom))
    }

    fn release_shadow(&mut self, policy: &Policy) -> Result<()> {
        self.live_shadow.sub(policy.entered_epoch, policy.sps)?;
        self.locked_coverage = self
            .locked_coverage
            .checked_sub(policy.coverage)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }
}

impl Tx<'_> {
    pub(crate) fn mint_policy(
        &mut self,
        payer: Address,
        beneficiary: Address,
        terms: CoverTerms,
    ) -> Result<PolicyId> {
        self.require_initialized()?;
        if beneficiary.is_zero() || payer.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        let quote = self.state.quote_cover(self.pricing, &terms)?;

        let id = self.state.next_policy_id;
        self.state.next_policy_id += 1;
        let entered_epoch = self.current_epoch() + 1;

        self.state.accumulator.accrue_premium(quote.fee)?;
        self.state.accumulator.add_sps(quote.sps)?;
        self.state.live_shadow.add(entered_epoch, quote.sps)?;
        self.state.locked_coverage = self
            .state
            .locked_coverage
            .checked_add(terms.coverage)
            .ok_or(LedgerError::Overflow)?;
        self.state.policies.insert(
            id,
            Policy {
                id,
                beneficiary,
                coverage: terms.coverage,
                fee: quote.fee,
                settle_deposit: quote.settle_fee,
                entered_epoch,
                duration_days: terms.duration_days,
                standard_risk: self.state.standard_risk,
                risk_level: quote.risk_level,
                sps: quote.sps,
                minted_at: self.now,
                status: PolicyStatus::Active,
            },
        );

        self.effect(Effect::TransferIn {
            from: payer,
            amount: quote.total_cost(),
        });
        self.emit(PoolEvent::PolicyMinted {
            policy: id,
            beneficiary,
            coverage: terms.coverage,
            fee: quote.fee,
            duration_days: terms.duration_days,
            entered_epoch,
        });
        info!(
            policy = id,
            %beneficiary,
            coverage = terms.coverage,
            fee = quote.fee,
            sps = quote.sps,
            entered_epoch,
            "policy minted"
        );
        Ok(id)
    }

    pub(crate) fn claim_apply(&mut self, caller: Address, id: PolicyId) -> Result<()> {
        let current = self.current_epoch();
        let clock = *self.state.accumulator.clock();
        let policy = self.state.policy(id)?;
        if policy.beneficiary != caller {
            return Err(LedgerError::SenderNotBeneficiary);
        }
        let next = policy.status.apply()?;
        if current < policy.entered_epoch {
            return Err(LedgerError::PolicyNotInForce);
        }
        if self.now >= policy.expires_at(&clock)? {
            return Err(LedgerError::PolicyAlreadyStale);
        }

        self.state.policy_mut(id)?.status = next;
        self.emit(PoolEvent::ClaimApplied { policy: id });
        info!(policy = id, "claim applied");
        Ok(())
    }

    pub(crate) fn approve_apply(&mut self, caller: Address, id: PolicyId) -> Result<Amount> {
        self.require_judger(&caller)?;
        let current = self.current_epoch();
        let policy = self.state.policy(id)?.clone();
        let next = policy.status.approve()?;

        let from_reserve = self.reserve_available.min(policy.coverage);
        let wanted = policy.coverage - from_reserve;
        let (covering, headroom) = self.state.backing(policy.entered_epoch, current)?;
        let from_pool = if covering == 0 || wanted == 0 || headroom == 0 {
            0
        } else {
            let loss_per_share = per_share(wanted.min(covering), covering)
                .ok_or(LedgerError::Overflow)?
                .min(headroom);
            self.state.losses.add(policy.entered_epoch, loss_per_share)?;
            apply_per_share(covering, loss_per_share).ok_or(LedgerError::Overflow)?
        };
        let payout = from_reserve + from_pool;
        if payout < policy.coverage {
            warn!(
                policy = id,
                coverage = policy.coverage,
                payout,
                "claim only partially funded"
            );
        }

        self.state.release_shadow(&policy)?;
        self.state.policy_mut(id)?.status = next;
        self.reserve_available -= from_reserve;

        self.effect(Effect::DrawReserve(from_reserve));
        self.effect(Effect::TransferOut {
            to: policy.beneficiary,
            amount: payout + policy.settle_deposit,
        });
        self.emit(PoolEvent::ClaimApproved {
            policy: id,
            payout,
            from_reserve,
            from_pool,
        });
        info!(policy = id, payout, from_reserve, from_pool, "claim approved");
        Ok(payout)
    }

    pub(crate) fn refuse_apply(&mut self, caller: Address, id: PolicyId) -> Result<()> {
        self.require_judger(&caller)?;
        let next = self.state.policy(id)?.status.refuse()?;
        self.state.policy_mut(id)?.status = next;
        self.emit(PoolEvent::ClaimRefused { policy: id });
        warn!(policy = id, "claim refused");
        Ok(())
    }

    pub(crate) fn settle(&mut self, caller: Address, id: PolicyId) -> Result<Amount> {
        let clock = *self.state.accumulator.clock();
        let grace = self.state.config.settle_grace_secs;
        let policy = self.state.policy(id)?.clone();
        let next = policy.status.settle()?;
        let expires_at = policy.expires_at(&clock)?;
        if self.now < expires_at {
            return Err(LedgerError::PolicyNotExpired);
        }
        if self.now < expires_at.saturating_add(grace) && caller != policy.beneficiary {
            return Err(LedgerError::SenderNotBeneficiary);
        }

        self.state.release_shadow(&policy)?;
        self.state.policy_mut(id)?.status = next;

        self.effect(Effect::TransferOut {
            to: caller,
            amount: policy.settle_deposit,
        });
        self.emit(PoolEvent::PolicySettled {
            policy: id,
            settler: caller,
            settle_fee: policy.settle_deposit,
        });
        info!(policy = id, settler = %caller, "policy settled");
        Ok(policy.settle_deposit)
    }

    pub(crate) fn cancel_policy(&mut self, caller: Address, id: PolicyId) -> Result<Amount> {
        let current = self.current_epoch();
        let policy = self.state.policy(id)?.clone();
        if policy.beneficiary != caller {
            return Err(LedgerError::SenderNotBeneficiary);
        }
        let next = policy.status.cancel()?;
        if current >= policy.entered_epoch {
            return Err(LedgerError::PolicyAlreadyInForce);
        }

        self.state.accumulator.revoke_premium(policy.fee)?;
        self.state.accumulator.revoke_sps(policy.sps)?;
        self.state.release_shadow(&policy)?;
        self.state.policy_mut(id)?.status = next;

        let refund = policy.fee + policy.settle_deposit;
        self.effect(Effect::TransferOut {
            to: caller,
            amount: refund,
        });
        self.emit(PoolEvent::PolicyCancelled { policy: id, refund });
        info!(policy = id, refund, "policy cancelled");
        Ok(refund)
    }
}
