//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify:
//! - Bit conservation and custody solvency across arbitrary operation sequences
//! - Exactness: deposit then withdraw everything returns the deposit
//! - Price scaling of derived balances, scaled balances unchanged
//! - Deterministic replay of the committed event stream
//! - Rollback leaves no trace under the default commit policy

use chrono::{TimeZone, Utc};
use elastic_ledger::{
    math,
    oracle::{FeedOracle, ManualClock, ManualFeed},
    replay, Account, AccountId, Error, InMemoryFunds, Ledger, LedgerEvent, ManualPriceSource,
    Price, PriceSource, RebaseCommit,
};
use primitive_types::U256;
use proptest::prelude::*;

const HOLDERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

#[derive(Debug, Clone)]
enum Op {
    Deposit(usize, u128),
    Withdraw(usize, u128),
    WithdrawAll(usize),
    Transfer(usize, usize, u128),
    Mint(usize, u128),
    Burn(usize, u128),
    SetPrice(u64),
    InvalidPrice,
}

/// Raw 8-decimal prices from 0.00000001 to 10 000.00
fn price_strategy() -> impl Strategy<Value = u64> {
    1u64..=1_000_000_000_000u64
}

/// Reference amounts up to one million whole units
fn amount_strategy() -> impl Strategy<Value = u128> {
    1u128..=1_000_000_000_000_000_000_000_000u128
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let holder = 0..HOLDERS.len();
    prop_oneof![
        (holder.clone(), amount_strategy()).prop_map(|(h, u)| Op::Deposit(h, u)),
        (holder.clone(), amount_strategy()).prop_map(|(h, u)| Op::Withdraw(h, u)),
        holder.clone().prop_map(Op::WithdrawAll),
        (holder.clone(), holder.clone(), amount_strategy()).prop_map(|(a, b, x)| Op::Transfer(a, b, x)),
        (holder.clone(), amount_strategy()).prop_map(|(h, x)| Op::Mint(h, x)),
        (holder, amount_strategy()).prop_map(|(h, x)| Op::Burn(h, x)),
        price_strategy().prop_map(Op::SetPrice),
        Just(Op::InvalidPrice),
    ]
}

fn id(index: usize) -> AccountId {
    AccountId::new(HOLDERS[index])
}

/// Ledger whose holders each start with plenty of reference asset
fn create_test_ledger(
    raw_price: u64,
    policy: RebaseCommit,
) -> (ManualPriceSource, InMemoryFunds, Ledger<ManualPriceSource, InMemoryFunds>) {
    let source = ManualPriceSource::new("prop-feed", raw_price);
    let funds = InMemoryFunds::new();
    for holder in HOLDERS {
        funds.fund(&AccountId::new(holder), U256::exp10(30));
    }
    let ledger = Ledger::with_policy(source.clone(), funds.clone(), policy).unwrap();
    (source, funds, ledger)
}

fn apply(ledger: &mut Ledger<ManualPriceSource, InMemoryFunds>, source: &ManualPriceSource, op: &Op) {
    let _ = match op {
        Op::Deposit(h, u) => ledger.deposit(&id(*h), &id(*h), U256::from(*u)).map(|_| ()),
        Op::Withdraw(h, u) => ledger.withdraw(&id(*h), &id(*h), U256::from(*u)).map(|_| ()),
        Op::WithdrawAll(h) => ledger.withdraw_all(&id(*h), &id(*h)).map(|_| ()),
        Op::Transfer(a, b, x) => ledger.transfer(&id(*a), &id(*b), U256::from(*x)).map(|_| ()),
        Op::Mint(h, x) => ledger.mint(&id(*h), &id(*h), U256::from(*x)).map(|_| ()),
        Op::Burn(h, x) => ledger.burn(&id(*h), &id(*h), U256::from(*x)).map(|_| ()),
        Op::SetPrice(p) => {
            source.set_price(*p);
            Ok(())
        }
        Op::InvalidPrice => {
            source.set_invalid();
            Ok(())
        }
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Σ(bits) == TOTAL_BITS and custody covers every issued bit,
    /// after every operation, failed or not
    #[test]
    fn prop_bit_conservation(
        initial in price_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let (source, funds, mut ledger) = create_test_ledger(initial, RebaseCommit::WithOperation);
        for op in &ops {
            apply(&mut ledger, &source, op);
            prop_assert!(ledger.check_conservation().is_ok());
            prop_assert!(funds.custody_balance() >= ledger.total_underlying());

            let held: U256 = HOLDERS
                .iter()
                .fold(U256::zero(), |acc, h| acc + ledger.bits_of(&Account::real(*h)));
            prop_assert_eq!(held, ledger.active_bits());
        }
    }

    /// Property: Deposit u, any price moves, withdraw all → exactly u back
    #[test]
    fn prop_deposit_withdraw_exact(
        u in amount_strategy(),
        prices in prop::collection::vec(price_strategy(), 1..10),
    ) {
        let (source, funds, mut ledger) = create_test_ledger(prices[0], RebaseCommit::WithOperation);
        let alice = AccountId::new("alice");
        let before = funds.holder_balance(&alice);

        prop_assume!(ledger.deposit(&alice, &alice, U256::from(u)).is_ok());
        for price in &prices {
            source.set_price(*price);
            ledger.rebase().unwrap();
        }

        let paid = ledger.withdraw_all(&alice, &alice).unwrap();
        prop_assert_eq!(paid, U256::from(u));
        prop_assert_eq!(funds.holder_balance(&alice), before);
        prop_assert!(ledger.active_bits().is_zero());
    }

    /// Property: Other holders minting and burning around a deposit never
    /// eat into it; withdraw all still returns exactly u
    #[test]
    fn prop_deposit_exact_amid_mint_and_burn(
        u in 10_000_000_000u128..=1_000_000_000_000_000_000_000_000u128,
        initial in price_strategy(),
        ops in prop::collection::vec(
            prop_oneof![
                (1usize..3, 1u128..1_000_000_000_000u128).prop_map(|(h, x)| Op::Mint(h, x)),
                (1usize..3, 1u128..1_000_000_000_000u128).prop_map(|(h, x)| Op::Burn(h, x)),
                (1usize..3, amount_strategy()).prop_map(|(h, x)| Op::Mint(h, x)),
                (1usize..3).prop_map(Op::WithdrawAll),
                price_strategy().prop_map(Op::SetPrice),
            ],
            1..40,
        ),
    ) {
        let (source, funds, mut ledger) = create_test_ledger(initial, RebaseCommit::WithOperation);
        let alice = AccountId::new("alice");
        let before = funds.holder_balance(&alice);
        prop_assume!(ledger.deposit(&alice, &alice, U256::from(u)).is_ok());

        for op in &ops {
            apply(&mut ledger, &source, op);
            prop_assert!(funds.custody_balance() >= ledger.total_underlying());
        }

        prop_assert_eq!(ledger.withdraw_all(&alice, &alice).unwrap(), U256::from(u));
        prop_assert_eq!(funds.holder_balance(&alice), before);
        prop_assert!(funds.custody_balance() >= ledger.total_underlying());

        for holder in 1..3 {
            let _ = ledger.withdraw_all(&id(holder), &id(holder));
            prop_assert!(funds.custody_balance() >= ledger.total_underlying());
        }
    }

    /// Property: Balance follows the price, scaled balance does not move
    #[test]
    fn prop_price_scaling(
        u in amount_strategy(),
        p1 in price_strategy(),
        p2 in price_strategy(),
    ) {
        let (source, _, mut ledger) = create_test_ledger(p1, RebaseCommit::WithOperation);
        let alice = AccountId::new("alice");
        prop_assume!(ledger.deposit(&alice, &alice, U256::from(u)).is_ok());

        source.set_price(p2);
        let balance = ledger.balance_of(&Account::from(&alice));
        let expected = U256::from(u) * U256::from(p2) / U256::exp10(8);

        prop_assert!(balance >= expected);
        prop_assert!(balance <= expected + expected / U256::exp10(18) + 1);
        prop_assert_eq!(ledger.scaled_balance_of(&Account::from(&alice)), U256::from(u));
    }

    /// Property: Readings above MAX_PRICE clamp, zero never becomes a price
    #[test]
    fn prop_price_clamping(excess in 1u64..u64::MAX) {
        let raw = U256::from(math::MAX_PRICE) + U256::from(excess);
        prop_assert_eq!(Price::new(raw), Some(Price::MAX));
        prop_assert_eq!(Price::new(U256::zero()), None);
    }

    /// Property: Committed events replay to the live balances
    #[test]
    fn prop_deterministic_replay(
        initial in price_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let (source, _, mut ledger) = create_test_ledger(initial, RebaseCommit::WithOperation);
        for op in &ops {
            apply(&mut ledger, &source, op);
        }

        let events: Vec<LedgerEvent> = ledger.events().iter().map(|e| e.event.clone()).collect();
        let rebuilt = replay(&events).unwrap();

        for holder in HOLDERS {
            let account = Account::real(holder);
            prop_assert_eq!(rebuilt.bits_of(&account), ledger.bits_of(&account));
        }
        prop_assert_eq!(rebuilt.latest(), Some((ledger.epoch(), ledger.last_price())));
    }

    /// Property: A rejected withdrawal changes nothing, rebase included
    #[test]
    fn prop_rollback_leaves_no_trace(
        u in amount_strategy(),
        p1 in price_strategy(),
        p2 in price_strategy(),
    ) {
        let (source, funds, mut ledger) = create_test_ledger(p1, RebaseCommit::WithOperation);
        let alice = AccountId::new("alice");
        prop_assume!(ledger.deposit(&alice, &alice, U256::from(u)).is_ok());

        let status = ledger.status();
        let event_count = ledger.events().len();

        source.set_price(p2);
        funds.set_reject_all(true);
        let result = ledger.withdraw_all(&alice, &alice);
        prop_assert!(matches!(
            result,
            Err(Error::TransferRejected(_)) | Err(Error::ZeroAmount(_))
        ));

        prop_assert_eq!(ledger.epoch(), status.epoch);
        prop_assert_eq!(ledger.last_price(), status.last_price);
        prop_assert_eq!(ledger.active_bits(), status.active_bits);
        prop_assert_eq!(ledger.events().len(), event_count);
    }

    /// Property: Rounds up to the threshold old are usable, older ones are not
    #[test]
    fn prop_staleness_boundary(age in 0i64..200_000i64, answer in 1i128..1_000_000_000_000i128) {
        let written = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(written);
        let feed = ManualFeed::new(8);
        feed.answer(answer, written);
        let oracle = FeedOracle::with_clock("feed", feed, clock.clone(), 86_400);

        clock.advance(age);
        let reading = oracle.get_price();
        prop_assert_eq!(reading.is_valid, age <= 86_400);
    }
}

#[test]
fn test_three_to_four_dollar_scenario() {
    let (source, _, mut ledger) = create_test_ledger(300_000_000, RebaseCommit::WithOperation);
    let alice = AccountId::new("alice");
    let one = U256::exp10(18);

    ledger.deposit(&alice, &alice, one).unwrap();
    assert_eq!(ledger.balance_of(&Account::from(&alice)), U256::from(3u64) * one);

    source.set_price(400_000_000u64);
    assert_eq!(ledger.balance_of(&Account::from(&alice)), U256::from(4u64) * one);
    assert_eq!(ledger.scaled_balance_of(&Account::from(&alice)), one);
}

#[test]
fn test_stale_feed_keeps_price_and_epoch() {
    let written = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(written);
    let feed = ManualFeed::new(8);
    feed.answer(300_000_000, written);
    let oracle = FeedOracle::with_clock("feed", feed.clone(), clock.clone(), 86_400);

    let funds = InMemoryFunds::new();
    let alice = AccountId::new("alice");
    funds.fund(&alice, U256::exp10(18));
    let mut ledger = Ledger::new(oracle, funds).unwrap();
    ledger.deposit(&alice, &alice, U256::exp10(18)).unwrap();
    let epoch = ledger.epoch();

    feed.answer(500_000_000, written);
    clock.advance(86_401);
    ledger.rebase().unwrap();

    assert_eq!(ledger.epoch(), epoch);
    assert_eq!(ledger.last_price().get(), 300_000_000);
    assert_eq!(
        ledger.balance_of(&Account::from(&alice)),
        U256::from(3u64) * U256::exp10(18)
    );
}

#[test]
fn test_independent_policy_keeps_rebase_on_failure() {
    let (source, funds, mut ledger) = create_test_ledger(100_000_000, RebaseCommit::Independent);
    let alice = AccountId::new("alice");
    ledger.deposit(&alice, &alice, U256::exp10(18)).unwrap();
    let epoch = ledger.epoch();

    source.set_price(200_000_000u64);
    funds.set_reject_all(true);
    assert!(ledger.withdraw_all(&alice, &alice).is_err());

    assert_eq!(ledger.epoch(), epoch + 1);
    assert_eq!(ledger.last_price().get(), 200_000_000);
    assert_eq!(ledger.scaled_balance_of(&Account::from(&alice)), U256::exp10(18));
}
