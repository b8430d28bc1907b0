//! Checked fixed-point helpers.
//!
//! All accumulator math runs on `u128` with [`PRECISION`](crate::PRECISION)
//! scaling. Results round toward zero, so rounding dust always stays in the
//! pool rather than being over-credited to a position. Debits charged to a
//! position round up instead, through the `_ceil` variants.

use crate::{BPS_DENOMINATOR, PRECISION};

/// Compute `a * b / denominator`, returning `None` on overflow or a zero
/// denominator.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    a.checked_mul(b).map(|product| product / denominator)
}

/// Compute `a * b / denominator` rounded up.
pub fn mul_div_ceil(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let product = a.checked_mul(b)?;
    Some(product / denominator + u128::from(product % denominator != 0))
}

/// Per-share value of `amount` spread over `shares` units, scaled by
/// `PRECISION`. Returns `None` when `shares` is zero.
pub fn per_share(amount: u128, shares: u128) -> Option<u128> {
    mul_div(amount, PRECISION, shares)
}

/// Apply a per-share value to a share count: `shares * per_share / PRECISION`.
pub fn apply_per_share(shares: u128, per_share: u128) -> Option<u128> {
    mul_div(shares, per_share, PRECISION)
}

/// [`apply_per_share`] rounded up, for amounts charged to a holder.
pub fn apply_per_share_ceil(shares: u128, per_share: u128) -> Option<u128> {
    mul_div_ceil(shares, per_share, PRECISION)
}

/// Take `bps` basis points of `amount`.
pub fn bps_of(amount: u128, bps: u32) -> Option<u128> {
    mul_div(amount, u128::from(bps), BPS_DENOMINATOR)
}

/// Convert basis points into a `PRECISION`-scaled fraction.
pub fn bps_to_fraction(bps: u32) -> u128 {
    u128::from(bps) * (PRECISION / BPS_DENOMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_basic() {
        assert_eq!(mul_div(10, 3, 4), Some(7));
        assert_eq!(mul_div(0, 3, 4), Some(0));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(mul_div(10, 3, 0), None);
    }

    #[test]
    fn test_mul_div_overflow() {
        assert_eq!(mul_div(u128::MAX, 2, 1), None);
    }

    #[test]
    fn test_per_share_roundtrip_rounds_down() {
        let ps = per_share(1_000, 3).expect("per share");
        let back = apply_per_share(3, ps).expect("apply");
        assert!(back <= 1_000);
        assert!(1_000 - back <= 1);
    }

    #[test]
    fn test_ceil_rounds_up_only_with_remainder() {
        assert_eq!(mul_div_ceil(10, 3, 4), Some(8));
        assert_eq!(mul_div_ceil(12, 3, 4), Some(9));
        assert_eq!(mul_div_ceil(0, 3, 4), Some(0));
        assert_eq!(mul_div_ceil(1, 1, 0), None);

        let ps = per_share(1_000, 3).expect("per share");
        assert_eq!(apply_per_share(1, ps), Some(333));
        assert_eq!(apply_per_share_ceil(1, ps), Some(334));
        assert_eq!(apply_per_share_ceil(7, PRECISION), Some(7));
    }

    #[test]
    fn test_bps() {
        assert_eq!(bps_of(10_000, 250), Some(250));
        assert_eq!(bps_of(1_000_000, 10_000), Some(1_000_000));
        assert_eq!(bps_to_fraction(10_000), PRECISION);
        assert_eq!(bps_to_fraction(100), PRECISION / 100);
    }
}
