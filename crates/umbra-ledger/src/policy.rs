//! Policies and the claim state machine.
//!
//! ```text
//!             apply              approve
//!   Active ──────────▶ ClaimApplying ──────────▶ Claimed
//!     │  ▲                  │
//!     │  └──── refuse ──────┘
//!     ├── settle ─▶ Settled
//!     └── cancel ─▶ Cancelled
//! ```
//!
//! `Claimed`, `Settled` and `Cancelled` are terminal.

use serde::{Deserialize, Serialize};
use umbra_epoch::clock::EpochClock;
use umbra_types::{Address, Amount, EpochId, PolicyId};

use crate::{LedgerError, Result};

/// Lifecycle status of a policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    /// In force or waiting to enter force.
    Active,
    /// A claim awaits the judger.
    ClaimApplying,
    /// Paid out.
    Claimed,
    /// Expired and settled without payout.
    Settled,
    /// Cancelled before entering force.
    Cancelled,
}

impl PolicyStatus {
    /// Whether the policy no longer holds shadow.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PolicyStatus::Claimed | PolicyStatus::Settled | PolicyStatus::Cancelled
        )
    }

    fn terminal_error(self) -> Option<LedgerError> {
        match self {
            PolicyStatus::Claimed => Some(LedgerError::PolicyAlreadyClaimed),
            PolicyStatus::Settled | PolicyStatus::Cancelled => {
                Some(LedgerError::PolicyAlreadyCancelled)
            }
            PolicyStatus::Active | PolicyStatus::ClaimApplying => None,
        }
    }

    /// Beneficiary files a claim.
    pub fn apply(self) -> Result<Self> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        match self {
            PolicyStatus::Active => Ok(PolicyStatus::ClaimApplying),
            _ => Err(LedgerError::ClaimUnderProcessing),
        }
    }

    /// Judger accepts the claim.
    pub fn approve(self) -> Result<Self> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        match self {
            PolicyStatus::ClaimApplying => Ok(PolicyStatus::Claimed),
            _ => Err(LedgerError::ClaimNotUnderProcessing),
        }
    }

    /// Judger rejects the claim.
    pub fn refuse(self) -> Result<Self> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        match self {
            PolicyStatus::ClaimApplying => Ok(PolicyStatus::Active),
            _ => Err(LedgerError::ClaimNotUnderProcessing),
        }
    }

    /// Expired policy settles without payout.
    pub fn settle(self) -> Result<Self> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        match self {
            PolicyStatus::Active => Ok(PolicyStatus::Settled),
            _ => Err(LedgerError::ClaimUnderProcessing),
        }
    }

    /// Beneficiary withdraws the cover before it enters force.
    pub fn cancel(self) -> Result<Self> {
        if let Some(err) = self.terminal_error() {
            return Err(err);
        }
        match self {
            PolicyStatus::Active => Ok(PolicyStatus::Cancelled),
            _ => Err(LedgerError::ClaimUnderProcessing),
        }
    }
}

/// What a buyer asks to be covered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverTerms {
    /// Payout on an approved claim.
    pub coverage: Amount,
    /// Cover length in days.
    pub duration_days: u32,
    /// Spot price of the insured index (0 = unused).
    #[serde(default)]
    pub spot: u128,
    /// Trigger price of the insured index (0 = unused).
    #[serde(default)]
    pub strike: u128,
}

impl CoverTerms {
    /// Plain cover without a parametric trigger.
    pub fn new(coverage: Amount, duration_days: u32) -> Self {
        Self {
            coverage,
            duration_days,
            spot: 0,
            strike: 0,
        }
    }

    /// Attach the trigger prices.
    pub fn with_trigger(mut self, spot: u128, strike: u128) -> Self {
        self.spot = spot;
        self.strike = strike;
        self
    }
}

/// Price of a cover against the current pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverQuote {
    /// Annual risk level charged.
    pub risk_level: u128,
    /// Premium.
    pub fee: Amount,
    /// Settlement deposit due on top of the premium.
    pub settle_fee: Amount,
    /// Shadow per unit of principal the cover would lock.
    pub sps: u128,
    /// Largest coverage the pool accepts right now.
    pub max_coverage: Amount,
}

impl CoverQuote {
    /// Total the buyer pays.
    pub fn total_cost(&self) -> Amount {
        self.fee.saturating_add(self.settle_fee)
    }
}

/// A purchased cover.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Sequential id.
    pub id: PolicyId,
    /// Who may claim, settle during grace, and cancel.
    pub beneficiary: Address,
    /// Payout on an approved claim.
    pub coverage: Amount,
    /// Premium paid.
    pub fee: Amount,
    /// Settlement deposit held until settlement, claim or cancel.
    pub settle_deposit: Amount,
    /// First epoch the policy is in force.
    pub entered_epoch: EpochId,
    /// Cover length in days.
    pub duration_days: u32,
    /// Standard risk at mint time.
    pub standard_risk: Amount,
    /// Annual risk level charged.
    pub risk_level: u128,
    /// Shadow per unit of principal, `PRECISION`-scaled.
    pub sps: u128,
    /// Mint timestamp.
    pub minted_at: u64,
    /// Lifecycle status.
    pub status: PolicyStatus,
}

impl Policy {
    /// Epoch at whose start the cover ends.
    pub fn expiry_epoch(&self, clock: &EpochClock) -> Result<EpochId> {
        let days_in_epochs = u64::from(self.duration_days)
            .checked_mul(umbra_types::EPOCH_LENGTH_SECS)
            .ok_or(LedgerError::Overflow)?
            .div_ceil(clock.length());
        self.entered_epoch
            .checked_add(days_in_epochs)
            .ok_or(LedgerError::Overflow)
    }

    /// Timestamp at which the cover ends.
    pub fn expires_at(&self, clock: &EpochClock) -> Result<u64> {
        Ok(clock.timestamp_of(self.expiry_epoch(clock)?)?)
    }

    /// Whether the cover protects at `now`.
    pub fn is_in_force(&self, clock: &EpochClock, now: u64) -> Result<bool> {
        if self.status.is_settled() {
            return Ok(false);
        }
        let starts = clock.timestamp_of(self.entered_epoch)?;
        Ok(now >= starts && now < self.expires_at(clock)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(entered: EpochId, days: u32) -> Policy {
        Policy {
            id: 1,
            beneficiary: Address::repeat_byte(7),
            coverage: 1_000,
            fee: 10,
            settle_deposit: 1,
            entered_epoch: entered,
            duration_days: days,
            standard_risk: 1,
            risk_level: 0,
            sps: 0,
            minted_at: 0,
            status: PolicyStatus::Active,
        }
    }

    #[test]
    fn test_claim_round() {
        let applying = PolicyStatus::Active.apply().expect("apply");
        assert_eq!(applying, PolicyStatus::ClaimApplying);
        assert_eq!(applying.apply(), Err(LedgerError::ClaimUnderProcessing));
        assert_eq!(applying.refuse(), Ok(PolicyStatus::Active));
        assert_eq!(applying.approve(), Ok(PolicyStatus::Claimed));
    }

    #[test]
    fn test_terminal_states() {
        for status in [PolicyStatus::Settled, PolicyStatus::Cancelled] {
            assert_eq!(status.apply(), Err(LedgerError::PolicyAlreadyCancelled));
            assert_eq!(status.settle(), Err(LedgerError::PolicyAlreadyCancelled));
            assert_eq!(status.approve(), Err(LedgerError::PolicyAlreadyCancelled));
        }
        let claimed = PolicyStatus::Claimed;
        assert_eq!(claimed.apply(), Err(LedgerError::PolicyAlreadyClaimed));
        assert_eq!(claimed.settle(), Err(LedgerError::PolicyAlreadyClaimed));
        assert_eq!(claimed.cancel(), Err(LedgerError::PolicyAlreadyClaimed));
    }

    #[test]
    fn test_no_judgement_without_claim() {
        assert_eq!(
            PolicyStatus::Active.approve(),
            Err(LedgerError::ClaimNotUnderProcessing)
        );
        assert_eq!(
            PolicyStatus::Active.refuse(),
            Err(LedgerError::ClaimNotUnderProcessing)
        );
        assert_eq!(
            PolicyStatus::ClaimApplying.settle(),
            Err(LedgerError::ClaimUnderProcessing)
        );
    }

    #[test]
    fn test_is_settled() {
        assert!(!PolicyStatus::Active.is_settled());
        assert!(!PolicyStatus::ClaimApplying.is_settled());
        assert!(PolicyStatus::Claimed.is_settled());
        assert!(PolicyStatus::Settled.is_settled());
        assert!(PolicyStatus::Cancelled.is_settled());
    }

    #[test]
    fn test_expiry_and_force() {
        let clock = EpochClock::daily(0);
        let p = policy(2, 30);
        assert_eq!(p.expiry_epoch(&clock).expect("expiry"), 32);
        assert!(!p.is_in_force(&clock, 86_400).expect("force"));
        assert!(p.is_in_force(&clock, 2 * 86_400).expect("force"));
        assert!(p.is_in_force(&clock, 32 * 86_400 - 1).expect("force"));
        assert!(!p.is_in_force(&clock, 32 * 86_400).expect("force"));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&PolicyStatus::ClaimApplying).expect("ser");
        assert_eq!(json, "\"claim_applying\"");
    }
}
