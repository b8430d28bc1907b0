//! Integration test harness for the Umbra workspace.
//!
//! The tests under `tests/` drive a pool backed by in-memory custody
//! through complete lifecycles across the ledger, epoch, pricing and
//! storage crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p umbra-integration-tests
//! ```

use umbra_ledger::memory::{EventLog, InMemoryCustody, InMemoryReserve, RoleTable};
use umbra_ledger::{InsurancePool, PoolConfig};
use umbra_pricing::LinearPremiumOracle;
use umbra_types::{units, Address, Amount};

/// Seconds per epoch.
pub const DAY: u64 = 86_400;

pub const OWNER: Address = Address::repeat_byte(0x01);
pub const JUDGER: Address = Address::repeat_byte(0x02);
pub const OFFICIAL: Address = Address::repeat_byte(0x03);
pub const ALICE: Address = Address::repeat_byte(0xA1);
pub const BOB: Address = Address::repeat_byte(0xB0);
pub const CAROL: Address = Address::repeat_byte(0xC0);
pub const BUYER: Address = Address::repeat_byte(0xD0);
pub const STRANGER: Address = Address::repeat_byte(0x5A);
pub const RESERVE: Address = Address::repeat_byte(0xEE);

/// Starting balance of every actor.
pub const STARTING_BALANCE: Amount = units(100_000);

/// Pool type under test.
pub type TestPool = InsurancePool<InMemoryCustody, InMemoryReserve>;

/// Timestamp of the start of day `n`.
pub fn day(n: u64) -> u64 {
    n * DAY
}

/// Flat 1% annual risk, no slope, no reserve cut: a 1000-unit,
/// 365-day cover costs exactly 10 units.
pub fn flat_config() -> PoolConfig {
    PoolConfig {
        risk_slope_bps: 0,
        reserve_premium_bps: 0,
        ..PoolConfig::default()
    }
}

/// An initialized pool with funded actors and an event log.
pub struct Harness {
    pub pool: TestPool,
    pub events: EventLog,
}

impl Harness {
    /// Pool with [`flat_config`] and the given risk reserve.
    pub fn new(reserve: Amount) -> Self {
        Self::with_config(flat_config(), reserve)
    }

    pub fn with_config(config: PoolConfig, reserve: Amount) -> Self {
        let mut custody = InMemoryCustody::new();
        for actor in [ALICE, BOB, CAROL, BUYER, STRANGER] {
            custody.mint(actor, STARTING_BALANCE);
        }
        custody.mint(RESERVE, reserve);

        let roles = RoleTable::new(OWNER)
            .with_judger(JUDGER)
            .with_official(OFFICIAL);
        let mut pool = InsurancePool::new(
            config,
            custody,
            InMemoryReserve::new(RESERVE, reserve),
            Box::new(roles),
            Box::new(LinearPremiumOracle::new()),
        )
        .expect("valid config");
        pool.initialize(OWNER, 0).expect("initialize");

        let events = EventLog::new();
        pool.add_observer(Box::new(events.clone()));
        Self { pool, events }
    }

    /// Custody balance of an actor.
    pub fn balance(&self, who: &Address) -> Amount {
        self.pool.custody().balance_of(who)
    }

    /// Sum of every balance plus the pool; constant over any history.
    pub fn total_supply(&self) -> Amount {
        self.pool.custody().total_supply()
    }
}
