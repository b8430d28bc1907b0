//! # umbra-ledger
//!
//! Liquidity pool ledger for parametric cover.
//!
//! Providers open positions (certificates) that back every policy entering
//! force while they are in the pool. Buyers mint policies whose premiums are
//! shared among earning positions and whose coverage is locked against the
//! positions that back them until the policy settles or pays out.
//!
//! Every entry point on [`InsurancePool`] runs as one transaction: it first
//! finalizes any crossed epoch boundary, then validates and mutates a staged
//! copy of the [`PoolState`], then executes custody and reserve effects, and
//! only then commits. A failure at any step leaves the pool untouched.
//!
//! ## Modules
//!
//! - [`config`]: pool parameters
//! - [`collaborators`]: custody, reserve, authority and observer seams
//! - [`memory`]: in-memory collaborators for simulation and tests
//! - [`ownership`]: position ownership table
//! - [`position`]: certificates and their reward/exposure math
//! - [`policy`]: policies and the claim state machine
//! - [`state`]: pool state and snapshots
//! - [`pool`]: the transactional engine

pub mod collaborators;
pub mod config;
pub mod memory;
pub mod ownership;
pub mod policy;
pub mod pool;
pub mod position;
pub mod state;

mod admin;
mod exposure;
mod tx;

pub use collaborators::{AssetCustody, Authority, PoolObserver, RiskReserve};
pub use config::PoolConfig;
pub use policy::{CoverQuote, CoverTerms, Policy, PolicyStatus};
pub use pool::{InsurancePool, PoolSummary};
pub use position::Position;
pub use state::{PoolSnapshot, PoolState, PositionExposure};

use umbra_types::{Amount, PolicyId, PositionId};

use crate::collaborators::{CustodyError, ReserveError};

/// Error types for ledger operations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Deposit below the minimum liquidity.
    #[error("insufficient liquidity: {provided} below minimum {minimum}")]
    InsufficientLiquidity {
        /// Amount offered.
        provided: Amount,
        /// Configured minimum.
        minimum: Amount,
    },

    /// Caller lacks the role or ownership the operation requires.
    #[error("insufficient privilege")]
    InsufficientPrivilege,

    /// Coverage exceeds the insurable share of the pool.
    #[error("coverage {coverage} exceeds insurable maximum {maximum}")]
    CoverageTooLarge {
        /// Requested coverage.
        coverage: Amount,
        /// Maximum insurable coverage right now.
        maximum: Amount,
    },

    /// Policy duration has already elapsed.
    #[error("policy is already stale")]
    PolicyAlreadyStale,

    /// A claim is already being processed for this policy.
    #[error("claim is under processing")]
    ClaimUnderProcessing,

    /// No claim is being processed for this policy.
    #[error("claim is not under processing")]
    ClaimNotUnderProcessing,

    /// Policy has already paid out.
    #[error("policy is already claimed")]
    PolicyAlreadyClaimed,

    /// Policy was settled or cancelled.
    #[error("policy is already cancelled")]
    PolicyAlreadyCancelled,

    /// Caller is not the policy beneficiary.
    #[error("sender is not the beneficiary")]
    SenderNotBeneficiary,

    /// Position has nothing to claim.
    #[error("no rewards available")]
    NoRewards,

    /// Position already exited.
    #[error("certificate already exited")]
    CertificateExit,

    /// Position exit has not been signalled or finalized.
    #[error("certificate has not exited")]
    CertificateNotExit,

    /// Zero address supplied where an actor is required.
    #[error("invalid address")]
    InvalidAddress,

    /// Mining proxy is unset, zero, or not the caller.
    #[error("invalid mining proxy")]
    InvalidMiningProxy,

    /// `initialize` called twice.
    #[error("contract already initialized")]
    ContractAlreadyInitialized,

    /// Operation called before `initialize`.
    #[error("contract not initialized")]
    NotInitialized,

    /// Unknown position id.
    #[error("position {0} not found")]
    PositionNotFound(PositionId),

    /// Unknown policy id.
    #[error("policy {0} not found")]
    PolicyNotFound(PolicyId),

    /// Policy has not reached expiry.
    #[error("policy has not expired")]
    PolicyNotExpired,

    /// Policy has not entered force yet.
    #[error("policy is not in force")]
    PolicyNotInForce,

    /// Policy already entered force and can no longer be cancelled.
    #[error("policy is already in force")]
    PolicyAlreadyInForce,

    /// Position still backs live policies.
    #[error("liquidity still locked: {locked}")]
    LiquidityStillLocked {
        /// Shadow still locked against the position.
        locked: Amount,
    },

    /// Parameter outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in ledger accounting")]
    Overflow,

    /// Epoch accounting failure.
    #[error("epoch: {0}")]
    Epoch(#[from] umbra_epoch::EpochError),

    /// Pricing failure.
    #[error("pricing: {0}")]
    Pricing(#[from] umbra_pricing::PricingError),

    /// Asset custody failure.
    #[error("custody: {0}")]
    Custody(#[from] CustodyError),

    /// Risk reserve failure.
    #[error("reserve: {0}")]
    Reserve(#[from] ReserveError),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
