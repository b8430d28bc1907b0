//! Pricing oracle.
//!
//! [`LinearPremiumOracle`] charges the annual risk rate pro rata over the
//! cover duration and discounts the result at the free rate, since the
//! premium is paid upfront for a payout that happens at the earliest at the
//! end of the first epoch.
//!
//! ```text
//! expected = coverage * risk_level * days / 365
//! premium  = expected / (1 + free_rate * days / 365)
//! ```
//!
//! Spot and strike describe the parametric trigger. A quote whose spot is
//! already at or below the strike is refused.

use serde::{Deserialize, Serialize};
use umbra_types::math::mul_div;
use umbra_types::{Amount, DAYS_PER_YEAR, PRECISION};

use crate::{PricingError, Result};

/// Inputs to a premium calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumQuote {
    /// Coverage amount.
    pub coverage: Amount,
    /// Cover duration in days.
    pub duration_days: u32,
    /// Annual risk level, `PRECISION`-scaled.
    pub risk_level: u128,
    /// Current spot price of the insured index (0 = unused).
    pub spot: u128,
    /// Trigger price of the insured index (0 = unused).
    pub strike: u128,
    /// Annual risk-free rate, `PRECISION`-scaled.
    pub free_rate: u128,
}

/// A premium pricing function.
pub trait PricingOracle {
    /// Premium for a quote.
    fn premium(&self, quote: &PremiumQuote) -> Result<Amount>;
}

/// Pro rata premium oracle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinearPremiumOracle;

impl LinearPremiumOracle {
    /// Create the oracle.
    pub fn new() -> Self {
        Self
    }
}

impl PricingOracle for LinearPremiumOracle {
    fn premium(&self, quote: &PremiumQuote) -> Result<Amount> {
        if quote.coverage == 0 {
            return Err(PricingError::InvalidQuote("coverage is zero"));
        }
        if quote.duration_days == 0 {
            return Err(PricingError::InvalidQuote("duration is zero"));
        }
        if quote.strike > 0 && quote.spot > 0 && quote.spot <= quote.strike {
            return Err(PricingError::TriggerAlreadyHit {
                spot: quote.spot,
                strike: quote.strike,
            });
        }

        let days = u128::from(quote.duration_days);
        let year = u128::from(DAYS_PER_YEAR);

        let annual = mul_div(quote.coverage, quote.risk_level, PRECISION).ok_or(PricingError::Overflow)?;
        let expected = mul_div(annual, days, year).ok_or(PricingError::Overflow)?;

        let accrued_rate = mul_div(quote.free_rate, days, year).ok_or(PricingError::Overflow)?;
        let discount = PRECISION
            .checked_add(accrued_rate)
            .ok_or(PricingError::Overflow)?;
        let premium = mul_div(expected, PRECISION, discount).ok_or(PricingError::Overflow)?;

        tracing::trace!(
            coverage = quote.coverage,
            days = quote.duration_days,
            risk_level = quote.risk_level,
            premium,
            "premium quoted"
        );

        Ok(premium)
    }
}
