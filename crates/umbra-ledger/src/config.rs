//! Pool parameters.
//!
//! Amounts are in base units and serialized as decimal strings, since TOML
//! integers cannot hold a `u128`. Rates are in basis points.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use umbra_pricing::RiskParameters;
use umbra_types::math::bps_to_fraction;
use umbra_types::{units, Amount, BPS_DENOMINATOR, EPOCH_LENGTH_SECS};

use crate::{LedgerError, Result};

/// Complete pool configuration.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Start of epoch 0 (Unix seconds).
    #[serde(default)]
    pub genesis_timestamp: u64,
    /// Epoch length in seconds.
    #[serde(default = "default_epoch_length")]
    pub epoch_length_secs: u64,
    /// Smallest accepted deposit.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Amount,
    /// Largest single cover as a share of total liquidity.
    #[serde(default = "default_max_insurable_bps")]
    pub max_insurable_bps: u32,
    /// Base annual risk rate.
    #[serde(default = "default_initial_risk_bps")]
    pub initial_risk_bps: u32,
    /// Annual rate added per `standard_risk` of coverage.
    #[serde(default = "default_risk_slope_bps")]
    pub risk_slope_bps: u32,
    /// Coverage size that adds one full `risk_slope`.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_standard_risk")]
    pub standard_risk: Amount,
    /// Annual risk-free rate used to discount premiums.
    #[serde(default)]
    pub free_rate_bps: u32,
    /// Flat fee paid to whoever settles an expired policy.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_settle_fee")]
    pub settle_fee: Amount,
    /// Window after expiry reserved for the beneficiary to settle.
    #[serde(default = "default_settle_grace")]
    pub settle_grace_secs: u64,
    /// Share of premiums routed to the risk reserve.
    #[serde(default = "default_reserve_premium_bps")]
    pub reserve_premium_bps: u32,
    /// Longest cover duration accepted.
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u32,
}

fn default_epoch_length() -> u64 {
    EPOCH_LENGTH_SECS
}

fn default_min_liquidity() -> Amount {
    units(10)
}

fn default_max_insurable_bps() -> u32 {
    5_000
}

fn default_initial_risk_bps() -> u32 {
    100
}

fn default_risk_slope_bps() -> u32 {
    100
}

fn default_standard_risk() -> Amount {
    units(100_000)
}

fn default_settle_fee() -> Amount {
    units(1)
}

fn default_settle_grace() -> u64 {
    7 * EPOCH_LENGTH_SECS
}

fn default_reserve_premium_bps() -> u32 {
    1_000
}

fn default_max_duration_days() -> u32 {
    730
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: 0,
            epoch_length_secs: default_epoch_length(),
            min_liquidity: default_min_liquidity(),
            max_insurable_bps: default_max_insurable_bps(),
            initial_risk_bps: default_initial_risk_bps(),
            risk_slope_bps: default_risk_slope_bps(),
            standard_risk: default_standard_risk(),
            free_rate_bps: 0,
            settle_fee: default_settle_fee(),
            settle_grace_secs: default_settle_grace(),
            reserve_premium_bps: default_reserve_premium_bps(),
            max_duration_days: default_max_duration_days(),
        }
    }
}

impl PoolConfig {
    /// Check every parameter is within range.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidParameter`] naming the first bad field
    pub fn validate(&self) -> Result<()> {
        if self.epoch_length_secs == 0 {
            return Err(LedgerError::InvalidParameter("epoch_length_secs"));
        }
        if self.min_liquidity == 0 {
            return Err(LedgerError::InvalidParameter("min_liquidity"));
        }
        validate_bps(self.max_insurable_bps, "max_insurable_bps")?;
        if self.max_insurable_bps == 0 {
            return Err(LedgerError::InvalidParameter("max_insurable_bps"));
        }
        validate_bps(self.reserve_premium_bps, "reserve_premium_bps")?;
        if self.standard_risk == 0 {
            return Err(LedgerError::InvalidParameter("standard_risk"));
        }
        if self.max_duration_days == 0 {
            return Err(LedgerError::InvalidParameter("max_duration_days"));
        }
        Ok(())
    }

    /// Pricing parameters for the given standard risk.
    pub fn risk_parameters(&self, standard_risk: Amount) -> RiskParameters {
        RiskParameters {
            initial_risk: bps_to_fraction(self.initial_risk_bps),
            risk_slope: bps_to_fraction(self.risk_slope_bps),
            standard_risk,
        }
    }
}

pub(crate) fn validate_bps(bps: u32, field: &'static str) -> Result<()> {
    if u128::from(bps) > BPS_DENOMINATOR {
        return Err(LedgerError::InvalidParameter(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use umbra_types::PRECISION;

    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = PoolConfig::default();
        config.validate().expect("defaults valid");
        assert_eq!(config.epoch_length_secs, 86_400);
        assert_eq!(config.max_insurable_bps, 5_000);
    }

    #[test]
    fn test_invalid_fields() {
        let mut config = PoolConfig {
            max_insurable_bps: 10_001,
            ..PoolConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(LedgerError::InvalidParameter("max_insurable_bps"))
        );
        config.max_insurable_bps = 10_000;
        config.standard_risk = 0;
        assert_eq!(
            config.validate(),
            Err(LedgerError::InvalidParameter("standard_risk"))
        );
    }

    #[test]
    fn test_risk_parameters() {
        let params = PoolConfig::default().risk_parameters(units(5));
        assert_eq!(params.initial_risk, PRECISION / 100);
        assert_eq!(params.risk_slope, PRECISION / 100);
        assert_eq!(params.standard_risk, units(5));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PoolConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        assert!(text.contains("min_liquidity = \"10000000\""));
        let parsed: PoolConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: PoolConfig =
            toml::from_str("genesis_timestamp = 1700000000\nsettle_fee = \"5\"").expect("parse");
        assert_eq!(parsed.genesis_timestamp, 1_700_000_000);
        assert_eq!(parsed.settle_fee, 5);
        assert_eq!(parsed.max_duration_days, 730);
    }
}
