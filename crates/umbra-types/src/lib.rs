//! # umbra-types
//!
//! Shared domain types used across the Umbra workspace: identifiers,
//! addresses, amount scaling, fixed-point helpers and pool events.

pub mod address;
pub mod events;
pub mod math;

pub use address::Address;

/// Token amount in base units (6 decimals).
pub type Amount = u128;

/// Sequential identifier of a liquidity position (certificate).
pub type PositionId = u64;

/// Sequential identifier of a policy.
pub type PolicyId = u64;

/// Sequential epoch index, 0 = genesis.
pub type EpochId = u64;

/// Base units per whole token unit.
pub const UNIT: Amount = 1_000_000;

/// Fixed-point scale for per-share accumulators and rates (1e18 = 1.0).
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Basis point denominator (10_000 bps = 100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Epoch length in seconds (24 hours).
pub const EPOCH_LENGTH_SECS: u64 = 86_400;

/// Days per year used to annualize risk rates.
pub const DAYS_PER_YEAR: u64 = 365;

/// Convert whole token units to base units.
pub const fn units(whole: u128) -> Amount {
    whole * UNIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(units(0), 0);
        assert_eq!(units(1), 1_000_000);
        assert_eq!(units(11_000), 11_000_000_000);
    }

    #[test]
    fn test_constants() {
        assert_eq!(EPOCH_LENGTH_SECS, 24 * 60 * 60);
        assert_eq!(PRECISION, 10u128.pow(18));
    }
}
