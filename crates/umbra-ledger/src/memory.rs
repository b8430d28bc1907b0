//! In-memory collaborators.
//!
//! Plain balance tables and role sets used by the simulator and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use umbra_types::events::PoolEvent;
use umbra_types::{Address, Amount};

use crate::collaborators::{
    AssetCustody, Authority, CustodyError, PoolObserver, ReserveError, RiskReserve,
};

/// Balance table with a single pool account.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCustody {
    balances: BTreeMap<Address, Amount>,
    pool_balance: Amount,
}

impl InMemoryCustody {
    /// Create an empty custody table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `account` out of thin air.
    pub fn mint(&mut self, account: Address, amount: Amount) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Balance of an account.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Tokens held by the pool.
    pub fn pool_balance(&self) -> Amount {
        self.pool_balance
    }

    /// Sum of every account plus the pool.
    pub fn total_supply(&self) -> Amount {
        self.balances
            .values()
            .fold(self.pool_balance, |acc, b| acc.saturating_add(*b))
    }
}

impl AssetCustody for InMemoryCustody {
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), CustodyError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                account: *from,
                needed: amount,
                available,
            });
        }
        self.balances.insert(*from, available - amount);
        self.pool_balance += amount;
        Ok(())
    }

    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), CustodyError> {
        if self.pool_balance < amount {
            return Err(CustodyError::InsufficientBalance {
                account: Address::ZERO,
                needed: amount,
                available: self.pool_balance,
            });
        }
        self.pool_balance -= amount;
        self.mint(*to, amount);
        Ok(())
    }
}

/// Reserve balance kept alongside a custody account.
#[derive(Clone, Debug)]
pub struct InMemoryReserve {
    account: Address,
    balance: Amount,
}

impl InMemoryReserve {
    /// Create a reserve whose funds live under `account`.
    pub fn new(account: Address, balance: Amount) -> Self {
        Self { account, balance }
    }
}

impl RiskReserve for InMemoryReserve {
    fn account(&self) -> Address {
        self.account
    }

    fn available_reserve(&self) -> Amount {
        self.balance
    }

    fn draw_from(&mut self, amount: Amount) -> Result<(), ReserveError> {
        if amount > self.balance {
            return Err(ReserveError::Insufficient {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    fn replenish(&mut self, amount: Amount) -> Result<(), ReserveError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(ReserveError::Overflow)?;
        Ok(())
    }
}

/// Static role assignment.
#[derive(Clone, Debug, Default)]
pub struct RoleTable {
    owner: Option<Address>,
    judgers: BTreeSet<Address>,
    officials: BTreeSet<Address>,
}

impl RoleTable {
    /// Create a table with an owner.
    pub fn new(owner: Address) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    /// Grant the judger role.
    pub fn with_judger(mut self, judger: Address) -> Self {
        self.judgers.insert(judger);
        self
    }

    /// Grant the official role.
    pub fn with_official(mut self, official: Address) -> Self {
        self.officials.insert(official);
        self
    }
}

impl Authority for RoleTable {
    fn is_owner(&self, who: &Address) -> bool {
        self.owner.as_ref() == Some(who)
    }

    fn is_judger(&self, who: &Address) -> bool {
        self.judgers.contains(who)
    }

    fn is_official(&self, who: &Address) -> bool {
        self.officials.contains(who)
    }
}

/// Observer that records every event; clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PoolEvent>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded event.
    pub fn events(&self) -> Vec<PoolEvent> {
        self.lock().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking reader leaves the Vec intact; keep recording.
    fn lock(&self) -> MutexGuard<'_, Vec<PoolEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PoolObserver for EventLog {
    fn notify(&self, event: &PoolEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custody_transfers() {
        let alice = Address::repeat_byte(1);
        let mut custody = InMemoryCustody::new();
        custody.mint(alice, 100);

        custody.transfer_in(&alice, 60).expect("in");
        assert_eq!(custody.balance_of(&alice), 40);
        assert_eq!(custody.pool_balance(), 60);

        custody.transfer_out(&alice, 10).expect("out");
        assert_eq!(custody.balance_of(&alice), 50);
        assert_eq!(custody.total_supply(), 100);
    }

    #[test]
    fn test_custody_insufficient() {
        let alice = Address::repeat_byte(1);
        let mut custody = InMemoryCustody::new();
        assert!(matches!(
            custody.transfer_in(&alice, 1),
            Err(CustodyError::InsufficientBalance { needed: 1, .. })
        ));
        assert!(custody.transfer_out(&alice, 1).is_err());
    }

    #[test]
    fn test_reserve() {
        let mut reserve = InMemoryReserve::new(Address::repeat_byte(9), 50);
        reserve.draw_from(20).expect("draw");
        assert_eq!(reserve.available_reserve(), 30);
        assert!(reserve.draw_from(31).is_err());
        reserve.replenish(5).expect("replenish");
        assert_eq!(reserve.available_reserve(), 35);
    }

    #[test]
    fn test_roles() {
        let owner = Address::repeat_byte(1);
        let judger = Address::repeat_byte(2);
        let roles = RoleTable::new(owner).with_judger(judger);
        assert!(roles.is_owner(&owner));
        assert!(!roles.is_owner(&judger));
        assert!(roles.is_judger(&judger));
        assert!(!roles.is_official(&judger));
    }

    #[test]
    fn test_event_log_shared() {
        let log = EventLog::new();
        let handle = log.clone();
        log.notify(&PoolEvent::ClaimApplied { policy: 1 });
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.events()[0], PoolEvent::ClaimApplied { policy: 1 });
    }

    #[test]
    fn test_event_log_survives_poisoned_lock() {
        let log = EventLog::new();
        let handle = log.clone();
        let poisoner = std::thread::spawn(move || {
            let _guard = handle.events.lock().expect("lock");
            std::panic::panic_any("poison the log");
        });
        assert!(poisoner.join().is_err());
        assert!(log.events.is_poisoned());

        log.notify(&PoolEvent::ClaimRefused { policy: 7 });
        assert_eq!(log.events(), vec![PoolEvent::ClaimRefused { policy: 7 }]);
    }
}
