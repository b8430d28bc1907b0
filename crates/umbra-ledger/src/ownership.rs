//! Position ownership.
//!
//! Certificates are referenced by id; who may act on one is answered by
//! this table alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use umbra_types::{Address, PositionId};

use crate::{LedgerError, Result};

/// Position id → owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTable {
    owners: BTreeMap<PositionId, Address>,
}

impl OwnershipTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the owner of a new position.
    pub fn assign(&mut self, id: PositionId, owner: Address) -> Result<()> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        self.owners.insert(id, owner);
        Ok(())
    }

    /// Owner of a position.
    pub fn owner_of(&self, id: PositionId) -> Result<Address> {
        self.owners
            .get(&id)
            .copied()
            .ok_or(LedgerError::PositionNotFound(id))
    }

    /// Move a position from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientPrivilege`] if `from` is not the owner
    /// - [`LedgerError::InvalidAddress`] if `to` is the zero address
    pub fn transfer(&mut self, id: PositionId, from: &Address, to: Address) -> Result<()> {
        self.require_owner(id, from)?;
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        self.owners.insert(id, to);
        Ok(())
    }

    /// Fail unless `who` owns the position.
    pub fn require_owner(&self, id: PositionId, who: &Address) -> Result<()> {
        if self.owner_of(id)? != *who {
            return Err(LedgerError::InsufficientPrivilege);
        }
        Ok(())
    }

    /// Positions owned by `who`, in id order.
    pub fn positions_of(&self, who: &Address) -> Vec<PositionId> {
        self.owners
            .iter()
            .filter(|(_, owner)| *owner == who)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Iterate every `(id, owner)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (PositionId, Address)> + '_ {
        self.owners.iter().map(|(id, owner)| (*id, *owner))
    }
}
