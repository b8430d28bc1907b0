//! Risk level derivation.
//!
//! ```text
//! risk_level = initial_risk + (coverage / standard_risk) * risk_slope
//! ```
//!
//! Rates are annualized and `PRECISION`-scaled (1e16 = 1% per year).

use serde::{Deserialize, Serialize};
use umbra_types::math::mul_div;
use umbra_types::Amount;

use crate::{PricingError, Result};

/// Pool-level pricing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Base annual risk rate.
    pub initial_risk: u128,
    /// Additional annual rate per `standard_risk` of coverage.
    pub risk_slope: u128,
    /// Coverage size that adds one full `risk_slope`.
    pub standard_risk: Amount,
}

/// Annual risk level for a cover of `coverage`.
///
/// # Errors
///
/// - [`PricingError::ZeroStandardRisk`] if `standard_risk` is zero
/// - [`PricingError::Overflow`] on arithmetic overflow
pub fn risk_level(coverage: Amount, params: &RiskParameters) -> Result<u128> {
    if params.standard_risk == 0 {
        return Err(PricingError::ZeroStandardRisk);
    }
    let surcharge =
        mul_div(coverage, params.risk_slope, params.standard_risk).ok_or(PricingError::Overflow)?;
    params
        .initial_risk
        .checked_add(surcharge)
        .ok_or(PricingError::Overflow)
}
