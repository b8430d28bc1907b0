//! Property tests over random operation sequences.
//!
//! The state machine fuzzer drives a pool with arbitrary deposits, exits,
//! purchases, claims and clock movements. Every operation either commits
//! fully or leaves the pool untouched, and after each step the aggregate
//! invariants must hold:
//!
//! - liquidity totals equal the sum of active principal
//! - earning plus pending entry liquidity equals the total
//! - live shadow and locked coverage match the unsettled policies
//! - the pool holds every provider's net principal and rewards plus the
//!   settlement deposits still outstanding
//! - custody supply never changes

use proptest::prelude::*;
use umbra_epoch::clock::EpochClock;
use umbra_epoch::index::EpochIndexedSum;
use umbra_integration_tests::{
    day, Harness, TestPool, ALICE, BOB, BUYER, CAROL, DAY, JUDGER, RESERVE, STRANGER,
};
use umbra_ledger::CoverTerms;
use umbra_types::{units, Address};

const PROVIDERS: [Address; 3] = [ALICE, BOB, CAROL];
const WATCHED: [Address; 6] = [ALICE, BOB, CAROL, BUYER, STRANGER, RESERVE];

#[derive(Clone, Debug)]
enum Action {
    Open { who: usize, amount: u64 },
    Exit { position: u64, immediate: bool },
    Withdraw { position: u64 },
    ClaimRewards { position: u64 },
    Mint { coverage: u64, days: u32 },
    Apply { policy: u64 },
    Approve { policy: u64 },
    Refuse { policy: u64 },
    Settle { policy: u64, by_stranger: bool },
    Cancel { policy: u64 },
    Wait { secs: u64 },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0..PROVIDERS.len(), 1u64..5_000).prop_map(|(who, amount)| Action::Open { who, amount }),
        1 => (1u64..8, any::<bool>()).prop_map(|(position, immediate)| Action::Exit { position, immediate }),
        1 => (1u64..8).prop_map(|position| Action::Withdraw { position }),
        1 => (1u64..8).prop_map(|position| Action::ClaimRewards { position }),
        2 => (1u64..3_000, 1u32..60).prop_map(|(coverage, days)| Action::Mint { coverage, days }),
        2 => (1u64..6).prop_map(|policy| Action::Apply { policy }),
        2 => (1u64..6).prop_map(|policy| Action::Approve { policy }),
        1 => (1u64..6).prop_map(|policy| Action::Refuse { policy }),
        1 => (1u64..6, any::<bool>()).prop_map(|(policy, by_stranger)| Action::Settle { policy, by_stranger }),
        1 => (1u64..6).prop_map(|policy| Action::Cancel { policy }),
        3 => (0u64..(10 * DAY)).prop_map(|secs| Action::Wait { secs }),
    ]
}

/// Apply one action at `now`; the result only matters as Ok or Err.
fn apply(pool: &mut TestPool, action: &Action, now: u64) -> Result<(), umbra_ledger::LedgerError> {
    match *action {
        Action::Open { who, amount } => pool.open_position(PROVIDERS[who], units(amount.into()), now).map(drop),
        Action::Exit { position, immediate } => {
            let owner = pool.state().ownership().owner_of(position)?;
            pool.exit(owner, position, immediate, now).map(drop)
        }
        Action::Withdraw { position } => {
            let owner = pool.state().ownership().owner_of(position)?;
            pool.withdraw_after_exit(owner, position, now).map(drop)
        }
        Action::ClaimRewards { position } => {
            let owner = pool.state().ownership().owner_of(position)?;
            pool.claim_rewards(owner, position, now).map(drop)
        }
        Action::Mint { coverage, days } => pool
            .mint_policy(BUYER, BUYER, CoverTerms::new(units(coverage.into()), days), now)
            .map(drop),
        Action::Apply { policy } => pool.claim_apply(BUYER, policy, now),
        Action::Approve { policy } => pool.approve_apply(JUDGER, policy, now).map(drop),
        Action::Refuse { policy } => pool.refuse_apply(JUDGER, policy, now),
        Action::Settle { policy, by_stranger } => {
            let caller = if by_stranger { STRANGER } else { BUYER };
            pool.settle(caller, policy, now).map(drop)
        }
        Action::Cancel { policy } => pool.cancel_policy(BUYER, policy, now).map(drop),
        Action::Wait { .. } => pool.poke(now).map(drop),
    }
}

fn balances(pool: &TestPool) -> Vec<u128> {
    let mut out: Vec<u128> = WATCHED.iter().map(|a| pool.custody().balance_of(a)).collect();
    out.push(pool.custody().pool_balance());
    out
}

fn assert_invariants(pool: &TestPool, supply: u128) {
    let state = pool.state();
    let liquidity = state.accumulator().liquidity();
    assert_eq!(state.active_principal(), state.total_liquidity());
    assert_eq!(liquidity.earning + liquidity.pending_entry, liquidity.total);

    let unsettled: Vec<_> = state.policies().filter(|p| !p.status.is_settled()).collect();
    let coverage: u128 = unsettled.iter().map(|p| p.coverage).sum();
    let sps: u128 = unsettled.iter().map(|p| p.sps).sum();
    assert_eq!(state.locked_coverage(), coverage);
    assert_eq!(state.live_shadow().total(), sps);

    let mut owed: u128 = unsettled.iter().map(|p| p.settle_deposit).sum();
    for position in state.positions().filter(|p| p.is_valid) {
        let exposure = state
            .exposure_of(position, state.accumulator())
            .expect("exposure");
        assert!(exposure.losses <= exposure.principal);
        owed += exposure.principal - exposure.losses + exposure.rewards;
    }
    assert!(
        pool.custody().pool_balance() >= owed,
        "pool holds {} but owes {}",
        pool.custody().pool_balance(),
        owed
    );

    assert_eq!(pool.custody().total_supply(), supply);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_histories_keep_invariants(
        actions in prop::collection::vec(action(), 1..60),
        reserve in prop_oneof![Just(0u128), Just(units(1_000))],
    ) {
        let mut h = Harness::new(reserve);
        let supply = h.total_supply();
        let mut now = 0;

        for action in &actions {
            if let Action::Wait { secs } = action {
                now += secs;
            }
            let before = (h.pool.snapshot(), balances(&h.pool));
            if apply(&mut h.pool, action, now).is_err() {
                prop_assert_eq!(&(h.pool.snapshot(), balances(&h.pool)), &before);
            }
            assert_invariants(&h.pool, supply);
        }
    }

    #[test]
    fn rewards_never_decrease_without_claims(
        deposits in prop::collection::vec((0..PROVIDERS.len(), 10u64..5_000), 1..6),
        covers in prop::collection::vec((1u64..500, 1u32..365, 0u64..(5 * DAY)), 1..8),
    ) {
        let mut h = Harness::new(0);
        let mut ids = Vec::new();
        for (who, amount) in deposits {
            ids.push(h.pool.open_position(PROVIDERS[who], units(amount.into()), 0).expect("open"));
        }

        let mut now = DAY;
        let mut last: Vec<u128> = vec![0; ids.len()];
        for (coverage, days, gap) in covers {
            now += gap;
            // Coverage may exceed the insurable share; rejected mints change nothing.
            let _ = h.pool.mint_policy(BUYER, BUYER, CoverTerms::new(units(coverage.into()), days), now);
            for (slot, id) in ids.iter().enumerate() {
                let rewards = h.pool.get_rewards(*id, now + DAY).expect("rewards");
                prop_assert!(rewards >= last[slot]);
                last[slot] = rewards;
            }
        }
    }

    #[test]
    fn views_and_epoch_checks_are_idempotent(gap in 0u64..(30 * DAY), repeat in 1usize..5) {
        let mut h = Harness::new(0);
        h.pool.open_position(ALICE, units(1_000), 0).expect("open");
        h.pool.mint_policy(BUYER, BUYER, CoverTerms::new(units(100), 30), day(1)).expect("mint");

        let viewed = h.pool.pool_summary(day(1) + gap).expect("summary");
        h.pool.poke(day(1) + gap).expect("poke");
        let once = h.pool.snapshot();
        for _ in 0..repeat {
            h.pool.poke(day(1) + gap).expect("poke");
        }
        prop_assert_eq!(&h.pool.snapshot(), &once);
        prop_assert_eq!(h.pool.pool_summary(day(1) + gap).expect("summary"), viewed);
    }

    #[test]
    fn clock_boundaries_bracket_timestamps(
        genesis in 0u64..1_000_000_000,
        length in 1u64..(7 * DAY),
        offset in 0u64..1_000_000_000,
    ) {
        let clock = EpochClock::new(genesis, length).expect("clock");
        let t = genesis + offset;
        let epoch = clock.epoch_index_of(t).expect("epoch");
        prop_assert!(clock.timestamp_of(epoch).expect("start") <= t);
        prop_assert!(t < clock.timestamp_of(epoch + 1).expect("next"));
        prop_assert_eq!(
            clock.seconds_until_next(t).expect("until"),
            clock.timestamp_of(epoch + 1).expect("next") - t
        );
    }

    #[test]
    fn index_range_sums_match_naive(
        adds in prop::collection::vec((0u64..64, 0u128..1_000_000), 1..40),
        from in 0u64..64,
        len in 0u64..64,
    ) {
        let mut index = EpochIndexedSum::new();
        let mut naive = vec![0u128; 64];
        for (epoch, amount) in adds {
            index.add(epoch, amount).expect("add");
            naive[epoch as usize] += amount;
        }
        let to = (from + len).min(63);
        let expected: u128 = naive[from as usize..=to as usize].iter().sum();
        prop_assert_eq!(index.range_sum(from, to), expected);
        prop_assert_eq!(index.total(), naive.iter().sum::<u128>());
    }
}
