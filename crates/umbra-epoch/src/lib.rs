//! # umbra-epoch
//!
//! Epoch-based accounting primitives for the insurance pool.
//!
//! Time is cut into fixed-length epochs. Premiums and newly minted exposure
//! collected during an epoch are folded into two cumulative per-share
//! accumulators (accRPS and accSPS) exactly once, at the boundary that closes
//! the epoch. Every position-level computation reads those frozen values, so
//! the order of calls inside an epoch never changes anyone's share.
//!
//! ## Modules
//!
//! - [`clock`]: timestamp ⇄ epoch index mapping
//! - [`accumulator`]: global accRPS/accSPS accumulator and liquidity totals
//! - [`index`]: growable prefix-sum index keyed by epoch

pub mod accumulator;
pub mod clock;
pub mod index;

use umbra_types::EpochId;

/// Error types for epoch accounting.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EpochError {
    /// Timestamp lies before the genesis boundary.
    #[error("timestamp {timestamp} is before genesis {genesis}")]
    TimestampBeforeGenesis {
        /// Offending timestamp.
        timestamp: u64,
        /// Genesis timestamp of the clock.
        genesis: u64,
    },

    /// Epoch length must be non-zero.
    #[error("epoch length must be positive")]
    InvalidEpochLength,

    /// Time moved backwards past the current epoch.
    #[error("time went backwards: epoch {requested} is before current epoch {current}")]
    NonMonotonicTime {
        /// Epoch derived from the supplied timestamp.
        requested: EpochId,
        /// Current finalized epoch.
        current: EpochId,
    },

    /// Timestamp lies too many epochs past the current one to catch up.
    #[error("epoch {requested} is too far ahead of current epoch {current}")]
    TooFarAhead {
        /// Epoch derived from the supplied timestamp.
        requested: EpochId,
        /// Current finalized epoch.
        current: EpochId,
    },

    /// Requested epoch has not been finalized yet.
    #[error("epoch {requested} not finalized (current {current})")]
    EpochNotFinalized {
        /// Requested epoch.
        requested: EpochId,
        /// Current finalized epoch.
        current: EpochId,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in epoch accounting")]
    Overflow,

    /// A subtraction would drive a running total below zero.
    #[error("arithmetic underflow in epoch accounting: {0}")]
    Underflow(&'static str),
}

/// Convenience result type for epoch operations.
pub type Result<T> = std::result::Result<T, EpochError>;
