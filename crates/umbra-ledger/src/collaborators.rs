//! External collaborators of the pool.
//!
//! The ledger never moves tokens, decides roles, or indexes history itself.
//! It asks these seams instead:
//!
//! - [`AssetCustody`] moves tokens between accounts and the pool
//! - [`RiskReserve`] backs claims before pool liquidity is touched
//! - [`Authority`] answers role queries
//! - [`PoolObserver`] receives committed events

use umbra_types::events::PoolEvent;
use umbra_types::{Address, Amount};

/// Custody failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    /// Account balance cannot cover the transfer.
    #[error("insufficient balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        /// Debited account.
        account: Address,
        /// Requested amount.
        needed: Amount,
        /// Current balance.
        available: Amount,
    },

    /// Transfer refused by the custodian.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Reserve failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    /// Reserve holds less than requested.
    #[error("reserve has {available}, requested {requested}")]
    Insufficient {
        /// Requested draw.
        requested: Amount,
        /// Reserve balance.
        available: Amount,
    },

    /// Arithmetic overflow in reserve accounting.
    #[error("reserve overflow")]
    Overflow,
}

/// Token custody for the pool.
pub trait AssetCustody {
    /// Move `amount` from `from` into the pool.
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), CustodyError>;

    /// Move `amount` from the pool to `to`.
    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), CustodyError>;
}

/// Risk reserve consulted before pool liquidity on claim payouts.
///
/// The reserve's funds sit in custody under [`RiskReserve::account`]; a draw
/// is followed by a custody transfer from that account into the pool and a
/// replenish by a transfer the other way.
pub trait RiskReserve {
    /// Custody account holding the reserve funds.
    fn account(&self) -> Address;

    /// Funds currently available for claims.
    fn available_reserve(&self) -> Amount;

    /// Take `amount` out of the reserve.
    fn draw_from(&mut self, amount: Amount) -> Result<(), ReserveError>;

    /// Add `amount` to the reserve.
    fn replenish(&mut self, amount: Amount) -> Result<(), ReserveError>;
}

/// Role checks for privileged operations.
pub trait Authority {
    /// Whether `who` is the pool owner.
    fn is_owner(&self, who: &Address) -> bool;

    /// Whether `who` may judge claims.
    fn is_judger(&self, who: &Address) -> bool;

    /// Whether `who` may set official risk figures.
    fn is_official(&self, who: &Address) -> bool;
}

/// Receives events after a transaction commits.
pub trait PoolObserver {
    /// Handle one committed event.
    fn notify(&self, event: &PoolEvent);
}
