//! # umbra-pricing
//!
//! Premium pricing for cover purchases.
//!
//! The pool treats pricing as an opaque pure function: it supplies a
//! [`PremiumQuote`] and receives a fee. The risk level fed into the quote is
//! derived from the pool's risk parameters by [`risk::risk_level`].
//!
//! ## Modules
//!
//! - [`risk`]: risk level from coverage and standard risk
//! - [`oracle`]: oracle trait and the linear premium oracle

pub mod oracle;
pub mod risk;

pub use oracle::{LinearPremiumOracle, PremiumQuote, PricingOracle};
pub use risk::RiskParameters;

/// Error types for pricing operations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    /// Quote has a zero coverage or duration.
    #[error("invalid quote: {0}")]
    InvalidQuote(&'static str),

    /// Standard risk must be positive.
    #[error("standard risk must be positive")]
    ZeroStandardRisk,

    /// The insured trigger is already hit at the current spot.
    #[error("trigger already hit: spot {spot} <= strike {strike}")]
    TriggerAlreadyHit {
        /// Current spot price.
        spot: u128,
        /// Trigger strike price.
        strike: u128,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in premium calculation")]
    Overflow,
}

/// Convenience result type for pricing operations.
pub type Result<T> = std::result::Result<T, PricingError>;
